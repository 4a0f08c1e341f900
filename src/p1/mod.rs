use crate::config::ConfigHolder;
use crate::queue::{EventSender, EventSink};
use crate::store::LastValueCache;
use log::{debug, error, info, warn};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

pub mod encoder;
pub mod line_parser;
pub mod meter_definitions;
pub mod processor;
pub mod structs;
pub mod utils;

use processor::LineProcessor;

/// Longest line accepted from the meter, longer ones are dropped.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Room for the line plus CR/LF in the read buffer.
const MAX_RAW_LINE: usize = MAX_LINE_LENGTH + 2;

#[derive(Error, Debug, PartialEq)]
pub enum P1Error {
    #[error("Line has no '(' and can not be split into key and value")]
    MalformedLine,
    #[error("Unable to parse numeric value '{0}'")]
    ValueParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    Line,
    /// Bytes thrown away because the line did not fit
    TooLong(usize),
    EndOfInput,
}

/// Reads up to and including the next `\n` into `buf` without ever holding
/// more than `MAX_RAW_LINE` bytes. An overlong line is discarded up to its
/// terminator and `buf` is left empty.
pub async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut dropped = 0usize;

    loop {
        let (used, found) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                if dropped > 0 {
                    return Ok(LineRead::TooLong(dropped));
                }
                if buf.is_empty() {
                    return Ok(LineRead::EndOfInput);
                }
                return Ok(LineRead::Line);
            }

            let (used, found) = match chunk.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (chunk.len(), false),
            };

            if dropped == 0 && buf.len() + used <= MAX_RAW_LINE {
                buf.extend_from_slice(&chunk[..used]);
            } else {
                dropped += buf.len() + used;
                buf.clear();
            }
            (used, found)
        };
        reader.consume(used);

        if found {
            if dropped > 0 {
                return Ok(LineRead::TooLong(dropped));
            }
            return Ok(LineRead::Line);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoopExit {
    EndOfInput,
    StateChanged(WorkerState),
}

pub struct P1Manager {
    config: Arc<RwLock<ConfigHolder>>,
    cache: LastValueCache,
    sender: EventSender,
    state_rx: watch::Receiver<WorkerState>,
}

impl P1Manager {
    pub fn new(
        config: Arc<RwLock<ConfigHolder>>,
        cache: LastValueCache,
        sender: EventSender,
        state_rx: watch::Receiver<WorkerState>,
    ) -> Self {
        Self {
            config,
            cache,
            sender,
            state_rx,
        }
    }

    /// Fresh processor from the current configuration, alarm state starts armed.
    fn build_processor(&self) -> (LineProcessor<EventSender>, String, Duration) {
        let holder = self.config.read().unwrap_or_else(|e| e.into_inner());
        let config = &holder.config;

        let definitions = config.definitions();
        let alarms = config.alarm_evaluator();
        info!(
            "P1 worker using {} items and {} alarms, GUID {}",
            definitions.len(),
            alarms.len(),
            holder.guid
        );

        let mut processor = LineProcessor::new(definitions, alarms, self.cache.clone(), holder.guid, self.sender.clone());
        processor.set_debug(config.debug);

        (
            processor,
            config.serial.port.clone(),
            Duration::from_secs(config.reconnect_time),
        )
    }

    pub async fn start_thread(&mut self) {
        info!("Starting P1 worker thread");

        loop {
            let state = *self.state_rx.borrow_and_update();
            match state {
                WorkerState::Quit => break,
                WorkerState::Stopped => {
                    debug!("P1 worker stopped, waiting for start");
                    if self.state_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                WorkerState::Running => {}
            }

            let (mut processor, port, reconnect) = self.build_processor();

            match tokio::fs::File::open(&port).await {
                Ok(file) => {
                    info!("Reading P1 data from {}", port);
                    match run_lines(BufReader::new(file), &mut processor, &mut self.state_rx).await {
                        Ok(LoopExit::StateChanged(WorkerState::Running)) => {
                            info!("Restarting P1 worker");
                            continue;
                        }
                        Ok(LoopExit::StateChanged(s)) => {
                            info!("P1 worker state changed to {:?}", s);
                            continue;
                        }
                        Ok(LoopExit::EndOfInput) => warn!("Serial device {} closed", port),
                        Err(e) => error!("Reading from {} failed: {}", port, e),
                    }
                }
                Err(e) => error!("Unable to open serial device {}: {}", port, e),
            }

            info!("Reopening {} in {:?}", port, reconnect);
            tokio::select! {
                _ = tokio::time::sleep(reconnect) => {}
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("P1 worker thread finished");
    }
}

/// Feeds every line of `reader` to `processor` until the input ends or the
/// worker state is touched. The state is only looked at between lines.
pub async fn run_lines<R, S>(
    mut reader: R,
    processor: &mut LineProcessor<S>,
    state_rx: &mut watch::Receiver<WorkerState>,
) -> std::io::Result<LoopExit>
where
    R: AsyncBufRead + Unpin,
    S: EventSink,
{
    let mut buf: Vec<u8> = Vec::with_capacity(MAX_RAW_LINE);

    loop {
        // Any notification ends the loop, a repeated Running means restart
        if state_rx.has_changed().unwrap_or(true) {
            return Ok(LoopExit::StateChanged(*state_rx.borrow_and_update()));
        }

        buf.clear();
        let read = tokio::select! {
            read = read_bounded_line(&mut reader, &mut buf) => read?,
            changed = state_rx.changed() => {
                let state = match changed {
                    Ok(_) => *state_rx.borrow_and_update(),
                    Err(_) => WorkerState::Quit,
                };
                return Ok(LoopExit::StateChanged(state));
            }
        };

        match read {
            LineRead::EndOfInput => return Ok(LoopExit::EndOfInput),
            LineRead::TooLong(dropped) => {
                debug!("Dropping line of {} bytes", dropped);
                continue;
            }
            LineRead::Line => {}
        }

        let text = String::from_utf8_lossy(&buf);
        let line = utils::strip_line_terminator(&text);
        if line.len() > MAX_LINE_LENGTH {
            debug!("Dropping line of {} bytes", line.len());
            continue;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(id) = utils::parse_identification_line(line) {
            info!("Telegram from meter {} ({})", id.manufacturer, id.identification);
            continue;
        }
        if utils::is_telegram_end(line) {
            debug!("End of telegram");
            continue;
        }

        processor.process_line(line);
    }
}
