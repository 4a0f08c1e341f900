use energy_p1::{
    queue, CommandHandler, ConfigHolder, LastValueCache, LogDrain, MqttManager, P1Manager, WorkerState,
    DEFAULT_CONFIG_FILE,
};
use log::{error, info};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::{env, time::Duration};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("P1_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let path = PathBuf::from(env::args().nth(1).unwrap_or(DEFAULT_CONFIG_FILE.to_string()));
    let holder = match ConfigHolder::load(&path) {
        Ok(h) => h,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
        }
    };

    let guid = holder.guid;
    let mqtt_config = holder.config.mqtt.clone();
    let (max_in, max_out) = (holder.config.max_in_queue as usize, holder.config.max_out_queue as usize);
    let config = Arc::new(RwLock::new(holder));

    // receive: driver -> host, send: host -> driver
    let (receive_tx, receive_rx) = queue::channel("receive", max_in);
    let (send_tx, send_rx) = queue::channel("send", max_out);
    let (state_tx, state_rx) = watch::channel(WorkerState::Running);
    let cache = LastValueCache::new();

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    let mut p1 = P1Manager::new(config.clone(), cache.clone(), receive_tx.clone(), state_rx);
    threads.push(tokio::spawn(async move {
        p1.start_thread().await;
    }));

    let mut command = CommandHandler::new(config.clone(), cache.clone(), send_rx, receive_tx, state_tx.clone());
    threads.push(tokio::spawn(async move {
        command.start_thread().await;
    }));

    match mqtt_config {
        Some(mqtt_config) => {
            let mut mqtt = MqttManager::new(&mqtt_config, receive_rx, send_tx.clone(), guid);
            threads.push(tokio::spawn(async move {
                mqtt.start_thread().await;
            }));
        }
        None => {
            let mut drain = LogDrain::new(receive_rx);
            threads.push(tokio::spawn(async move {
                drain.start_thread().await;
            }));
        }
    }

    /* Make sure to handle the dirty flag of the configuration */
    let save_config = config.clone();
    threads.push(tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let mut c = save_config.write().unwrap_or_else(|e| e.into_inner());
            if c.dirty && c.config.write {
                if let Err(e) = c.save() {
                    error!("Saving configuration failed: {}", e);
                }
            }
        }
    }));

    // Keeps the send queue open while no host feeds it
    let _send_tx = send_tx;

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut kill_all_tasks = false;
        for task in threads.iter() {
            if task.is_finished() {
                kill_all_tasks = true;
            }
        }

        if kill_all_tasks {
            state_tx.send_replace(WorkerState::Quit);
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    Ok(())
}
