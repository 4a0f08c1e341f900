use crate::config::ConfigHolder;
use crate::p1::WorkerState;
use crate::queue::{EventReceiver, EventSender, EventSink};
use crate::store::LastValueCache;
use crate::vscp::{VscpEvent, CLASS2_HLO, TYPE2_HLO_COMMAND};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::watch;

pub mod hlo;
pub mod variables;

use hlo::{HloFrame, HloRequest, HloResult};

#[derive(Error, Debug, PartialEq)]
pub enum HloError {
    #[error("HLO frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("HLO frame of {0} bytes does not fit an event")]
    TooLong(usize),
    #[error("Unsupported HLO frame type {0}")]
    UnsupportedType(u8),
    #[error("Encrypted HLO frames are not supported (encryption {0})")]
    Encrypted(u8),
    #[error("Invalid HLO JSON: {0}")]
    Json(String),
}

/// Serves HLO commands arriving on the send queue and answers on the receive queue.
pub struct CommandHandler {
    config: Arc<RwLock<ConfigHolder>>,
    cache: LastValueCache,
    receiver: EventReceiver,
    sender: EventSender,
    state_tx: watch::Sender<WorkerState>,
}

impl CommandHandler {
    pub fn new(
        config: Arc<RwLock<ConfigHolder>>,
        cache: LastValueCache,
        receiver: EventReceiver,
        sender: EventSender,
        state_tx: watch::Sender<WorkerState>,
    ) -> Self {
        CommandHandler {
            config,
            cache,
            receiver,
            sender,
            state_tx,
        }
    }

    pub async fn start_thread(&mut self) {
        info!("Starting CommandHandler thread");

        while let Some(event) = self.receiver.pop().await {
            let Some(response) = self.handle_event(&event) else {
                continue;
            };

            if let Err(e) = self.sender.push(response) {
                error!("HLO: failed to add response to receive queue: {}", e);
            }
        }

        info!("Send queue closed, CommandHandler exits");
    }

    /// Handles one event from the send queue, returning the response event if any.
    pub fn handle_event(&mut self, event: &VscpEvent) -> Option<VscpEvent> {
        if event.vscp_class != CLASS2_HLO || event.vscp_type != TYPE2_HLO_COMMAND {
            debug!("Ignoring event class={} type={}", event.vscp_class, event.vscp_type);
            return None;
        }

        let frame = match HloFrame::decode(&event.data) {
            Ok(f) => f,
            Err(e) => {
                error!("HLO: {}", e);
                return None;
            }
        };

        let request: HloRequest = match serde_json::from_value(frame.json) {
            Ok(r) => r,
            Err(e) => {
                error!("HLO-command: missing or invalid op: {}", e);
                return None;
            }
        };

        info!("HLO command '{}' from {}", request.op, frame.guid);
        let reply = self.execute(&request);
        self.make_response(&request.op, reply)
    }

    fn execute(&mut self, request: &HloRequest) -> Value {
        match request.op.as_str() {
            "noop" => json!({
                "op": "vscp-reply",
                "name": "noop",
                "result": "OK",
                "description": "NOOP command executed correctly.",
            }),
            "readvar" => {
                let holder = self.config.read().unwrap_or_else(|e| e.into_inner());
                variables::read_variable(request, &holder, &self.cache)
            }
            "writevar" => {
                let mut holder = self.config.write().unwrap_or_else(|e| e.into_inner());
                variables::write_variable(request, &mut holder, &self.cache)
            }
            "delvar" => {
                let mut holder = self.config.write().unwrap_or_else(|e| e.into_inner());
                variables::delete_variable(request, &mut holder, &self.cache)
            }
            "load" => {
                let mut holder = self.config.write().unwrap_or_else(|e| e.into_inner());
                let result = match holder.reload() {
                    Ok(_) => HloResult::Success,
                    Err(e) => {
                        error!("HLO load: {}", e);
                        HloResult::Error
                    }
                };
                op_reply("load", result)
            }
            "save" => {
                let mut holder = self.config.write().unwrap_or_else(|e| e.into_inner());
                let result = match holder.save() {
                    Ok(_) => HloResult::Success,
                    Err(crate::config::ConfigError::WriteDisabled) => HloResult::NotAllowed,
                    Err(e) => {
                        error!("HLO save: {}", e);
                        HloResult::Error
                    }
                };
                op_reply("save", result)
            }
            "stop" => {
                self.set_state(WorkerState::Stopped);
                op_reply("stop", HloResult::Success)
            }
            "start" => {
                self.set_state(WorkerState::Running);
                op_reply("start", HloResult::Success)
            }
            "restart" => {
                // Any notification makes a running worker rebuild its processor
                self.state_tx.send_replace(WorkerState::Running);
                op_reply("restart", HloResult::Success)
            }
            other => {
                warn!("HLO: unknown operation '{}'", other);
                op_reply(other, HloResult::UnknownOperation)
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!("Worker state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    fn make_response(&self, op: &str, reply: Value) -> Option<VscpEvent> {
        let guid = self.config.read().unwrap_or_else(|e| e.into_inner()).guid;

        let frame = HloFrame { guid, json: reply };
        match frame.into_response_event(guid) {
            Ok(ev) => Some(ev),
            Err(e) => {
                error!("HLO {}: unable to build response: {}", op, e);
                HloFrame {
                    guid,
                    json: op_reply(op, HloResult::Error),
                }
                .into_response_event(guid)
                .ok()
            }
        }
    }
}

fn op_reply(op: &str, result: HloResult) -> Value {
    json!({ "op": op, "result": result.code() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue;
    use crate::vscp::{Guid, CLASS1_ALARM, TYPE2_HLO_RESPONSE};
    use std::path::Path;
    use std::time::Duration;

    struct Fixture {
        handler: CommandHandler,
        state_rx: watch::Receiver<WorkerState>,
        config: Arc<RwLock<ConfigHolder>>,
    }

    fn fixture() -> Fixture {
        let config: Config = serde_yml::from_str("guid: \"AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:AA:01\"").unwrap();
        let config = Arc::new(RwLock::new(ConfigHolder::new(config, Path::new("p1.yaml"))));
        let (_send_tx, send_rx) = queue::channel("send", 10);
        let (recv_tx, _recv_rx) = queue::channel("receive", 10);
        let (state_tx, state_rx) = watch::channel(WorkerState::Running);
        let handler = CommandHandler::new(config.clone(), LastValueCache::new(), send_rx, recv_tx, state_tx);
        Fixture {
            handler,
            state_rx,
            config,
        }
    }

    fn command(json: Value) -> VscpEvent {
        HloFrame {
            guid: Guid([0x05; 16]),
            json,
        }
        .into_command_event(Guid([0x05; 16]))
        .unwrap()
    }

    fn response_json(ev: &VscpEvent) -> Value {
        assert_eq!(ev.vscp_class, CLASS2_HLO);
        assert_eq!(ev.vscp_type, TYPE2_HLO_RESPONSE);
        HloFrame::decode(&ev.data).unwrap().json
    }

    #[test]
    fn test_noop() {
        let mut f = fixture();
        let ev = f.handler.handle_event(&command(json!({"op": "noop"}))).unwrap();
        assert_eq!(ev.guid.0[15], 0x01);
        let r = response_json(&ev);
        assert_eq!(r["op"], "vscp-reply");
        assert_eq!(r["name"], "noop");
        assert_eq!(r["result"], "OK");
    }

    #[test]
    fn test_readvar_and_writevar() {
        let mut f = fixture();
        let ev = f
            .handler
            .handle_event(&command(json!({"op": "writevar", "name": "debug", "arg": true})))
            .unwrap();
        assert_eq!(response_json(&ev)["result"], 0);
        assert!(f.config.read().unwrap().config.debug);

        let ev = f
            .handler
            .handle_event(&command(json!({"op": "readvar", "name": "debug"})))
            .unwrap();
        assert_eq!(response_json(&ev)["arg"]["value"], true);
    }

    #[test]
    fn test_worker_state_ops() {
        let mut f = fixture();

        f.handler.handle_event(&command(json!({"op": "stop"})));
        assert!(f.state_rx.has_changed().unwrap());
        assert_eq!(*f.state_rx.borrow_and_update(), WorkerState::Stopped);

        f.handler.handle_event(&command(json!({"op": "start"})));
        assert_eq!(*f.state_rx.borrow_and_update(), WorkerState::Running);

        // Starting a running worker is not a change
        f.handler.handle_event(&command(json!({"op": "start"})));
        assert!(!f.state_rx.has_changed().unwrap());

        f.handler.handle_event(&command(json!({"op": "restart"})));
        assert!(f.state_rx.has_changed().unwrap());
        assert_eq!(*f.state_rx.borrow_and_update(), WorkerState::Running);
    }

    #[test]
    fn test_save_not_allowed() {
        let mut f = fixture();
        let ev = f.handler.handle_event(&command(json!({"op": "save"}))).unwrap();
        let r = response_json(&ev);
        assert_eq!(r["op"], "save");
        assert_eq!(r["result"], HloResult::NotAllowed.code());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("p1.yaml");
        std::fs::write(&path, "debug: true\n").unwrap();

        let mut f = fixture();
        f.config.write().unwrap().path = path;
        let ev = f.handler.handle_event(&command(json!({"op": "load"}))).unwrap();
        assert_eq!(response_json(&ev)["result"], 0);
        assert!(f.config.read().unwrap().config.debug);
    }

    #[test]
    fn test_load_missing_file() {
        let mut f = fixture();
        f.config.write().unwrap().path = "/nonexistent/p1.yaml".into();
        let ev = f.handler.handle_event(&command(json!({"op": "load"}))).unwrap();
        assert_eq!(response_json(&ev)["result"], HloResult::Error.code());
    }

    #[test]
    fn test_unknown_op() {
        let mut f = fixture();
        let ev = f.handler.handle_event(&command(json!({"op": "format"}))).unwrap();
        assert_eq!(response_json(&ev)["result"], HloResult::UnknownOperation.code());
    }

    #[test]
    fn test_ignored_events() {
        let mut f = fixture();
        let other = VscpEvent::new(CLASS1_ALARM, 2, Guid::default(), vec![0, 0, 0]);
        assert!(f.handler.handle_event(&other).is_none());

        let no_op = command(json!({"name": "debug"}));
        assert!(f.handler.handle_event(&no_op).is_none());

        let mut broken = command(json!({"op": "noop"}));
        broken.data.truncate(10);
        assert!(f.handler.handle_event(&broken).is_none());
    }

    #[tokio::test]
    async fn test_thread_answers_on_receive_queue() {
        let config = Arc::new(RwLock::new(ConfigHolder::new(Config::default(), Path::new("p1.yaml"))));
        let (send_tx, send_rx) = queue::channel("send", 10);
        let (recv_tx, mut recv_rx) = queue::channel("receive", 10);
        let (state_tx, _state_rx) = watch::channel(WorkerState::Running);
        let mut handler = CommandHandler::new(config, LastValueCache::new(), send_rx, recv_tx, state_tx);

        let handle = tokio::spawn(async move { handler.start_thread().await });
        send_tx.push(command(json!({"op": "noop"}))).unwrap();

        let ev = recv_rx.pop_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response_json(&ev)["name"], "noop");

        drop(send_tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
