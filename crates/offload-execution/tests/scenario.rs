use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use offload_common::config::{AppConfig, EngineKind};
use offload_execution::client::{Finished, ResponseEntry};
use offload_execution::cluster::{ClusterActor, ClusterEvent, ClusterOptions};
use offload_execution::device::{DeviceKind, Topology};
use offload_execution::engine::dqn::EpisodeSummary;
use offload_execution::error::ExecutionResult;
use offload_execution::id::{DeviceId, TaskId};
use offload_execution::task::{Task, TaskElement, TaskGenerator};
use offload_server::actor::ActorSystem;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

type Responses = Rc<RefCell<Vec<ResponseEntry>>>;
type Changes = Rc<RefCell<Vec<(DeviceId, f64)>>>;

fn start(
    topology: Topology,
    configure: impl FnOnce(&mut AppConfig),
) -> ExecutionResult<ActorSystem<ClusterActor>> {
    let mut config = AppConfig::load()?;
    configure(&mut config);
    let options = ClusterOptions::new(&config)?;
    ActorSystem::new((options, topology))
}

fn collect_responses(
    system: &mut ActorSystem<ClusterActor>,
    client: DeviceId,
) -> ExecutionResult<Responses> {
    let responses = Rc::new(RefCell::new(vec![]));
    let collected = responses.clone();
    system.actor_mut().when_done(
        client,
        Box::new(move |entries: &[ResponseEntry]| {
            collected.borrow_mut().extend_from_slice(entries);
        }),
    )?;
    Ok(responses)
}

fn monitor(system: &mut ActorSystem<ClusterActor>, devices: &[DeviceId]) -> ExecutionResult<Changes> {
    let changes = Rc::new(RefCell::new(vec![]));
    for id in devices {
        let observed = changes.clone();
        system
            .actor_mut()
            .devices_mut()
            .try_get_mut(*id)?
            .resource
            .set_monitor(Box::new(move |change| {
                observed
                    .borrow_mut()
                    .push((change.device_id, change.new_value));
            }));
    }
    Ok(changes)
}

fn cpu(system: &ActorSystem<ClusterActor>, id: DeviceId) -> ExecutionResult<f64> {
    Ok(system.actor().devices().try_get(id)?.resource.cpu())
}

fn element(id: u64, cpu: f64, deadline: f64) -> TaskElement {
    TaskElement::new(TaskId::from(id), "dummy", 3.0, cpu, deadline)
}

#[test]
fn test_edge_round_trip() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).cloud(50.0).build()?;
    let edge = topology.edges[0];
    let client = topology.clients[0];
    let mut system = start(topology, |_| {})?;
    let responses = collect_responses(&mut system, client)?;
    let changes = monitor(&mut system, &[edge])?;

    system.send(ClusterEvent::SubmitTask {
        client,
        task: Task::new(vec![element(1, 1.0, 2.0)]),
    });
    system.run_until(Duration::from_millis(500))?;
    assert_eq!(cpu(&system, edge)?, 1.0);
    assert!(responses.borrow().is_empty());

    system.run()?;
    assert_eq!(cpu(&system, edge)?, 2.0);
    assert_eq!(*changes.borrow(), vec![(edge, 1.0), (edge, 2.0)]);

    let responses = responses.borrow();
    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert_eq!(response.finished, Finished::Success);
    assert_eq!(response.device_type, Some(DeviceKind::Edge));
    assert_eq!(response.device_address.as_deref(), Some("10.1.1.1"));
    assert_eq!(response.processing_time, Some(0.5));

    let coordinator = system.actor().coordinator();
    assert!(coordinator.task_sequence().is_empty());
    assert_eq!(coordinator.engine().cache().view()[0].cpu, 2.0);
    Ok(())
}

#[test]
fn test_conflicting_decisions_accept_once() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).cloud(50.0).clients(2).build()?;
    let edge = topology.edges[0];
    let clients = topology.clients.clone();
    let mut system = start(topology, |config| {
        config.simulation.launch_delay_step_secs = 0.0;
    })?;
    let first = collect_responses(&mut system, clients[0])?;
    let second = collect_responses(&mut system, clients[1])?;
    let changes = monitor(&mut system, &[edge])?;

    // Both elements reach the coordinator before the edge server reports
    // its first deduction, so both are planned against the same belief.
    system.send(ClusterEvent::SubmitTask {
        client: clients[0],
        task: Task::new(vec![element(1, 1.5, 2.0)]),
    });
    system.send(ClusterEvent::SubmitTask {
        client: clients[1],
        task: Task::new(vec![element(2, 1.5, 2.0)]),
    });
    system.run()?;

    assert_eq!(*changes.borrow(), vec![(edge, 0.5), (edge, 2.0)]);
    let first = first.borrow();
    let second = second.borrow();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].device_type, Some(DeviceKind::Edge));
    assert_eq!(second[0].device_type, Some(DeviceKind::Cloud));
    assert_eq!(second[0].finished, Finished::Success);
    Ok(())
}

#[test]
fn test_clients_share_task_ids() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).cloud(50.0).clients(2).build()?;
    let clients = topology.clients.clone();
    let mut system = start(topology, |config| {
        config.simulation.launch_delay_step_secs = 0.0;
    })?;
    let first = collect_responses(&mut system, clients[0])?;
    let second = collect_responses(&mut system, clients[1])?;

    // Same group and task id from both clients; the second one conflicts at
    // the edge server and is placed again.
    for client in &clients {
        system.send(ClusterEvent::SubmitTask {
            client: *client,
            task: Task::new(vec![element(1, 1.5, 2.0)]),
        });
    }
    system.run()?;

    let first = first.borrow();
    let second = second.borrow();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].task_id, TaskId::from(1));
    assert_eq!(second[0].task_id, TaskId::from(1));
    assert_eq!(first[0].finished, Finished::Success);
    assert_eq!(second[0].finished, Finished::Success);
    assert_eq!(first[0].device_type, Some(DeviceKind::Edge));
    assert_eq!(second[0].device_type, Some(DeviceKind::Cloud));
    assert!(system.actor().coordinator().task_sequence().is_empty());
    Ok(())
}

#[test]
fn test_generated_tasks_from_two_clients_complete() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).cloud(50.0).clients(2).build()?;
    let clients = topology.clients.clone();
    let mut system = start(topology, |_| {})?;
    let first = collect_responses(&mut system, clients[0])?;
    let second = collect_responses(&mut system, clients[1])?;

    for (client, group) in clients.iter().zip(["a", "b"]) {
        let config = AppConfig::load()?.workload;
        let mut generator = TaskGenerator::new(config, ChaCha8Rng::seed_from_u64(5));
        system.send(ClusterEvent::SubmitTask {
            client: *client,
            task: generator.generate_group(3, group)?,
        });
    }
    system.run()?;

    for (responses, group) in [(first, "a"), (second, "b")] {
        let responses = responses.borrow();
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|x| x.group == group));
        assert!(responses.iter().all(|x| x.finished != Finished::Unfinished));
    }
    Ok(())
}

#[test]
fn test_resources_are_conserved() -> ExecutionResult<()> {
    let topology = Topology::builder()
        .edge(2.1)
        .edge(2.2)
        .edge(2.15)
        .cloud(50.0)
        .build()?;
    let edges = topology.edges.clone();
    let client = topology.clients[0];
    let config = AppConfig::load()?;
    let mut generator = TaskGenerator::new(config.workload.clone(), ChaCha8Rng::seed_from_u64(11));
    let task = generator.generate(10)?;
    let deadlines = task
        .elements()
        .iter()
        .map(|x| (x.task_id, x.deadline))
        .collect::<HashMap<_, _>>();

    let mut system = start(topology, |_| {})?;
    let initial = edges
        .iter()
        .map(|id| cpu(&system, *id))
        .collect::<ExecutionResult<Vec<_>>>()?;
    let responses = collect_responses(&mut system, client)?;
    let changes = monitor(&mut system, &edges)?;
    system.send(ClusterEvent::SubmitTask { client, task });
    system.run()?;

    let last = edges
        .iter()
        .map(|id| cpu(&system, *id))
        .collect::<ExecutionResult<Vec<_>>>()?;
    for (a, b) in last.iter().zip(initial.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
    for (device, value) in changes.borrow().iter() {
        let index = edges.iter().position(|x| x == device).unwrap_or(usize::MAX);
        assert!(*value >= -1e-9);
        assert!(*value <= initial[index] + 1e-9);
    }

    let responses = responses.borrow();
    assert_eq!(responses.len(), 10);
    for response in responses.iter() {
        assert_eq!(response.finished, Finished::Success);
        if response.device_type == Some(DeviceKind::Edge) {
            let time = response.processing_time.unwrap_or(f64::MAX);
            assert!(time < deadlines[&response.task_id]);
        }
    }
    Ok(())
}

#[test]
fn test_failure_without_feasible_device() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(0.5).build()?;
    let client = topology.clients[0];
    let mut system = start(topology, |_| {})?;
    let responses = collect_responses(&mut system, client)?;
    system.send(ClusterEvent::SubmitTask {
        client,
        task: Task::new(vec![element(1, 1.0, 2.0)]),
    });
    system.run()?;

    let responses = responses.borrow();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].finished, Finished::Failure);
    assert_eq!(responses[0].device_type, None);
    assert!(system.actor().coordinator().task_sequence().is_empty());
    Ok(())
}

#[test]
fn test_handle_next_without_pending_elements() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).build()?;
    let mut system = start(topology, |_| {})?;
    system.send(ClusterEvent::HandleNext);
    system.run()?;
    assert_eq!(system.now(), Duration::ZERO);
    assert_eq!(system.pending(), 0);
    Ok(())
}

#[test]
fn test_stop_time() -> ExecutionResult<()> {
    let topology = Topology::builder().edge(2.0).build()?;
    let client = topology.clients[0];
    let mut system = start(topology, |config| {
        config.simulation.stop_time_secs = 0.1;
    })?;
    system.send(ClusterEvent::SubmitTask {
        client,
        task: Task::new(vec![element(1, 1.0, 2.0)]),
    });
    system.run()?;
    assert!(system.is_stopped());
    assert_eq!(system.now(), Duration::from_millis(100));
    let entries = system
        .actor()
        .client(client)
        .map(|x| x.responses().iter().map(|e| e.finished).collect::<Vec<_>>());
    assert_eq!(entries, Some(vec![Finished::Unfinished]));
    Ok(())
}

#[test]
fn test_train_through_cluster() -> ExecutionResult<()> {
    let topology = Topology::builder()
        .edge(2.1)
        .edge(2.2)
        .edge(2.15)
        .cloud(50.0)
        .build()?;
    let mut system = start(topology, |config| {
        config.engine.kind = EngineKind::Dqn;
    })?;
    let summaries = Rc::new(RefCell::new(vec![]));
    let collected = summaries.clone();
    system
        .actor_mut()
        .when_episode_done(Box::new(move |summary: &EpisodeSummary| {
            collected.borrow_mut().push(summary.clone());
        }))?;
    let task = Task::new(vec![
        element(1, 0.7, 2.0),
        element(2, 1.3, 2.0),
        element(3, 0.9, 2.0),
    ]);
    system.send(ClusterEvent::Train { task, episodes: 2 });
    system.run()?;

    let summaries = summaries.borrow();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|x| x.completed));
    assert_eq!(
        summaries.iter().map(|x| x.episode).collect::<Vec<_>>(),
        vec![1, 2]
    );
    Ok(())
}
