//! The wire protocol between clients, the coordinator and the servers.
//!
//! Every message is a JSON object with a `msgtype` and a `content` key.
//! A payload that lacks either key is rejected before its content is read.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{DeviceKind, Endpoint};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::TaskId;
use crate::task::TaskElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Decision,
    Handling,
    Response,
}

/// The result of handling one task element.
/// A response without a device type reports an offloading failure.
///
/// The group and the origin of the element travel with the response so that
/// the coordinator can tell apart elements of different clients sharing a task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContent {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<u16>,
    pub device_type: Option<DeviceKind>,
    pub device_address: Option<String>,
    pub processing_time: Option<f64>,
}

impl ResponseContent {
    /// A failure response for the element, addressed to the same origin.
    pub fn failure(element: &TaskElement) -> Self {
        Self {
            task_id: element.task_id,
            group: Some(element.group.clone()),
            from_ip: element.from_ip,
            from_port: element.from_port,
            device_type: None,
            device_address: None,
            processing_time: None,
        }
    }

    pub fn origin(&self) -> Option<Endpoint> {
        match (self.from_ip, self.from_port) {
            (Some(host), Some(port)) => Some(Endpoint::new(host, port)),
            _ => None,
        }
    }

    /// Whether the response reports on this element of this client.
    pub fn is_for(&self, element: &TaskElement) -> bool {
        self.task_id == element.task_id
            && self.group.as_deref() == Some(element.group.as_str())
            && self.origin().is_some()
            && self.origin() == element.origin()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A task element sent to the coordinator for a placement decision.
    Decision { element: TaskElement },
    /// A task element sent to a server for execution.
    /// `cpu_supply` is the supply the decision engine believed the server had.
    Handling {
        element: TaskElement,
        cpu_supply: Option<f64>,
    },
    Response { content: ResponseContent },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    msgtype: MessageType,
    content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpu_supply: Option<f64>,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Decision { .. } => MessageType::Decision,
            Message::Handling { .. } => MessageType::Handling,
            Message::Response { .. } => MessageType::Response,
        }
    }

    pub fn encode(&self) -> ExecutionResult<Vec<u8>> {
        let envelope = match self {
            Message::Decision { element } => Envelope {
                msgtype: MessageType::Decision,
                content: serde_json::to_value(element)?,
                cpu_supply: None,
            },
            Message::Handling {
                element,
                cpu_supply,
            } => Envelope {
                msgtype: MessageType::Handling,
                content: serde_json::to_value(element)?,
                cpu_supply: *cpu_supply,
            },
            Message::Response { content } => Envelope {
                msgtype: MessageType::Response,
                content: serde_json::to_value(content)?,
                cpu_supply: None,
            },
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    pub fn decode(payload: &[u8]) -> ExecutionResult<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ExecutionError::InvalidMessage(e.to_string()))?;
        let Value::Object(object) = &value else {
            return Err(ExecutionError::InvalidMessage(
                "message is not an object".to_string(),
            ));
        };
        for key in ["msgtype", "content"] {
            if !object.contains_key(key) {
                return Err(ExecutionError::InvalidMessage(format!(
                    "missing key: {key}"
                )));
            }
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| ExecutionError::InvalidMessage(e.to_string()))?;
        let invalid = |e: serde_json::Error| ExecutionError::InvalidMessage(e.to_string());
        let message = match envelope.msgtype {
            MessageType::Decision => Message::Decision {
                element: serde_json::from_value(envelope.content).map_err(invalid)?,
            },
            MessageType::Handling => Message::Handling {
                element: serde_json::from_value(envelope.content).map_err(invalid)?,
                cpu_supply: envelope.cpu_supply,
            },
            MessageType::Response => Message::Response {
                content: serde_json::from_value(envelope.content).map_err(invalid)?,
            },
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element() -> TaskElement {
        let mut element = TaskElement::new(TaskId::from(3), "dummy", 2.5, 1.1, 2.2);
        element.set_origin(Endpoint::new(Ipv4Addr::new(10, 2, 0, 1), 8860));
        element
    }

    #[test]
    fn test_handling_message_preserves_believed_supply() -> ExecutionResult<()> {
        // A supply that has no short decimal representation must survive the wire
        // unchanged, since servers compare it against their own record with `!=`.
        let supply = 2.1 - 0.7 - 1e-13;
        let message = Message::Handling {
            element: element(),
            cpu_supply: Some(supply),
        };
        let decoded = Message::decode(&message.encode()?)?;
        let Message::Handling {
            element: e,
            cpu_supply: Some(s),
        } = decoded
        else {
            panic!("unexpected message: {decoded:?}");
        };
        assert_eq!(s.to_bits(), supply.to_bits());
        assert_eq!(e, element());
        Ok(())
    }

    #[test]
    fn test_task_element_wire_fields() -> ExecutionResult<()> {
        let payload = Message::Decision { element: element() }.encode()?;
        let value: Value = serde_json::from_slice(&payload)?;
        assert_eq!(value["msgtype"], "decision");
        let content = &value["content"];
        for key in [
            "task_id", "group", "size", "cpu", "deadline", "status", "from_ip", "from_port",
        ] {
            assert!(content.get(key).is_some(), "missing {key}");
        }
        assert_eq!(content["status"], "unprocessed");
        assert_eq!(content["from_ip"], "10.2.0.1");
        assert!(content.get("processing_time").is_none());
        Ok(())
    }

    #[test]
    fn test_response_with_null_device_type() -> ExecutionResult<()> {
        let payload = br#"{"msgtype":"response","content":{"task_id":5,"device_type":null,"device_address":null,"processing_time":null}}"#;
        let message = Message::decode(payload)?;
        assert_eq!(
            message,
            Message::Response {
                content: ResponseContent {
                    task_id: TaskId::from(5),
                    group: None,
                    from_ip: None,
                    from_port: None,
                    device_type: None,
                    device_address: None,
                    processing_time: None,
                }
            }
        );
        Ok(())
    }

    #[test]
    fn test_response_identifies_element() -> ExecutionResult<()> {
        let content = ResponseContent::failure(&element());
        let payload = Message::Response {
            content: content.clone(),
        }
        .encode()?;
        let value: Value = serde_json::from_slice(&payload)?;
        assert_eq!(value["content"]["group"], "dummy");
        assert_eq!(value["content"]["from_ip"], "10.2.0.1");
        assert_eq!(value["content"]["from_port"], 8860);
        assert!(content.is_for(&element()));

        let mut other = element();
        other.set_origin(Endpoint::new(Ipv4Addr::new(10, 2, 0, 2), 8860));
        assert!(!content.is_for(&other));
        let mut other = element();
        other.group = "another".to_string();
        assert!(!content.is_for(&other));
        Ok(())
    }

    #[test]
    fn test_reject_message_without_required_keys() {
        for payload in [
            &br#"{"content":{}}"#[..],
            &br#"{"msgtype":"decision"}"#[..],
            &br#"[1, 2]"#[..],
            &b"not json"[..],
            &br#"{"msgtype":"unknown","content":{}}"#[..],
            &br#"{"msgtype":"decision","content":{"task_id":1}}"#[..],
        ] {
            assert!(
                matches!(
                    Message::decode(payload),
                    Err(ExecutionError::InvalidMessage(_))
                ),
                "payload accepted: {}",
                String::from_utf8_lossy(payload)
            );
        }
    }
}
