//! Resource accounting on the servers that execute task elements.
//!
//! An edge server only accepts an element if the coordinator's belief about
//! its cpu matches its own record and the record covers the demand.
//! Otherwise the element goes back to the coordinator for another decision.

use crate::error::{ExecutionError, ExecutionResult};
use crate::resource::{ResourceRecord, CPU};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Accept,
    Conflict,
}

pub fn resolve(believed: Option<f64>, authoritative: f64, demand: f64) -> Resolution {
    match believed {
        Some(believed)
            if believed == authoritative && authoritative > 0.0 && authoritative >= demand =>
        {
            Resolution::Accept
        }
        _ => Resolution::Conflict,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    pub supply: f64,
    pub remaining: f64,
    pub processing_time: f64,
}

/// Deducts the demand from the record and returns the processing time
/// based on the supply before the deduction.
pub fn accept(record: &mut ResourceRecord, demand: f64) -> ExecutionResult<Acceptance> {
    validate_demand(demand)?;
    let supply = record.cpu();
    if supply <= 0.0 || supply < demand {
        return Err(ExecutionError::invalid(format!(
            "device {} cannot cover cpu demand {demand} with {supply}",
            record.device_id()
        )));
    }
    let remaining = supply - demand;
    record.set(CPU, remaining);
    Ok(Acceptance {
        supply,
        remaining,
        processing_time: demand / supply,
    })
}

/// Adds the demand back to the record and returns the old and new cpu.
pub fn release(record: &mut ResourceRecord, demand: f64) -> (f64, f64) {
    let current = record.cpu();
    let restored = current + demand;
    record.set(CPU, restored);
    (current, restored)
}

/// The processing time on a server that accepts every element without
/// deducting resources, or [None] if the server has no cpu.
pub fn unbounded_processing_time(record: &ResourceRecord, demand: f64) -> ExecutionResult<Option<f64>> {
    validate_demand(demand)?;
    let supply = record.cpu();
    if supply <= 0.0 {
        return Ok(None);
    }
    Ok(Some(demand / supply))
}

fn validate_demand(demand: f64) -> ExecutionResult<()> {
    if !demand.is_finite() || demand < 0.0 {
        return Err(ExecutionError::invalid(format!("invalid cpu demand: {demand}")));
    }
    Ok(())
}
