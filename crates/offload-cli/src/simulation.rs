use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};
use offload_common::config::AppConfig;
use offload_execution::client::ResponseEntry;
use offload_execution::cluster::{ClusterActor, ClusterEvent, ClusterOptions};
use offload_execution::device::Topology;
use offload_execution::engine::dqn::EpisodeSummary;
use offload_execution::id::DeviceId;
use offload_execution::task::{Task, TaskGenerator};
use offload_server::actor::ActorSystem;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct Setup {
    system: ActorSystem<ClusterActor>,
    client: DeviceId,
    task: Task,
}

fn setup(config: &AppConfig) -> Result<Setup, Box<dyn std::error::Error>> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.simulation.seed);
    let topology = Topology::generate(&config.topology, &mut rng)?;
    let client = *topology
        .clients
        .first()
        .ok_or("the topology has no client")?;
    let servers = topology
        .edges
        .iter()
        .chain(topology.cloud.iter())
        .copied()
        .collect::<Vec<_>>();
    let task = TaskGenerator::new(config.workload.clone(), rng).generate(config.workload.task_count)?;

    let options = ClusterOptions::new(config)?;
    let mut system = ActorSystem::<ClusterActor>::new((options, topology))?;
    for id in servers {
        let device = system.actor_mut().devices_mut().try_get_mut(id)?;
        let endpoint = device.endpoint;
        device.resource.set_monitor(Box::new(move |change| {
            debug!(
                "resource {} of server({endpoint}) changed: {:?} -> {}",
                change.key, change.old_value, change.new_value
            );
        }));
    }
    Ok(Setup {
        system,
        client,
        task,
    })
}

pub fn run_simulation(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Setup {
        mut system,
        client,
        task,
    } = setup(config)?;

    let completed = Rc::new(RefCell::new(None));
    let result = completed.clone();
    system.actor_mut().when_done(
        client,
        Box::new(move |entries: &[ResponseEntry]| {
            *result.borrow_mut() = Some(entries.to_vec());
        }),
    )?;
    system.send(ClusterEvent::SubmitTask { client, task });
    system.run()?;
    info!(
        "simulation ended at {:.6}s",
        system.now().as_secs_f64()
    );
    system.stop()?;

    match completed.borrow().as_ref() {
        Some(entries) => {
            println!("task_id\tgroup\tfinished\tdevice_type\tdevice_address\tprocessing_time");
            for entry in entries {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    entry.task_id,
                    entry.group,
                    entry.finished,
                    entry
                        .device_type
                        .map(|x| x.to_string())
                        .unwrap_or_default(),
                    entry.device_address.clone().unwrap_or_default(),
                    entry
                        .processing_time
                        .map(|x| format!("{x:.9}"))
                        .unwrap_or_default(),
                );
            }
        }
        None => warn!("the task group did not complete"),
    }
    Ok(())
}

pub fn run_training(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Setup {
        mut system, task, ..
    } = setup(config)?;

    let history = Rc::new(RefCell::new(vec![]));
    let recorded = history.clone();
    system
        .actor_mut()
        .when_episode_done(Box::new(move |summary: &EpisodeSummary| {
            recorded
                .borrow_mut()
                .push((summary.episode, summary.completed, summary.total_time));
        }))?;
    system.send(ClusterEvent::Train {
        task,
        episodes: config.dqn.episodes,
    });
    system.run()?;
    system.stop()?;

    println!("episode\tcompleted\ttotal_time");
    for (episode, completed, total_time) in history.borrow().iter() {
        println!("{episode}\t{completed}\t{total_time:.9}");
    }
    Ok(())
}
