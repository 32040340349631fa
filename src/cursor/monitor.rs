//! Background idle sweep
//!
//! A dedicated thread wakes every `sweep_interval_ms` and ages the table by
//! the wall-clock time since its previous pass. It never runs a scan.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::observability::{Event, Logger};

use super::table::ClientCursorTable;

enum Command {
    /// Sweep now, without waiting for the period
    Sweep,
    Stop,
}

pub struct CursorMonitor {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl CursorMonitor {
    pub fn start(table: Arc<ClientCursorTable>) -> std::io::Result<Self> {
        let period = Duration::from_millis(table.config().sweep_interval_ms);
        let (tx, rx) = mpsc::channel::<Command>();

        let handle = thread::Builder::new()
            .name("cursor-monitor".to_string())
            .spawn(move || {
                Logger::info(
                    Event::MonitorStart.as_str(),
                    &[("period_ms", period.as_millis().to_string().as_str())],
                );
                let mut last = Instant::now();
                loop {
                    match rx.recv_timeout(period) {
                        Ok(Command::Sweep) | Err(RecvTimeoutError::Timeout) => {
                            let now = Instant::now();
                            let elapsed = now.duration_since(last).as_millis() as u64;
                            last = now;
                            table.sweep_idle(elapsed);
                        }
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                Logger::info(Event::MonitorStop.as_str(), &[]);
            })?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Requests an immediate pass
    pub fn sweep_now(&self) {
        let _ = self.tx.send(Command::Sweep);
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CursorMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::client_cursor::{ClientCursor, CursorSource};
    use crate::cursor::config::CursorConfig;
    use crate::executor::Interrupt;
    use serde_json::json;

    #[test]
    fn test_monitor_times_out_idle_cursor() {
        let table = Arc::new(ClientCursorTable::new(CursorConfig {
            idle_timeout_ms: 20,
            sweep_interval_ms: 10,
            ..CursorConfig::default()
        }));
        let id = table.register(ClientCursor::new(
            "db.c",
            CursorSource::Buffered(vec![json!({"_id": 1})].into()),
            Interrupt::new(),
            json!({}),
        ));

        let monitor = CursorMonitor::start(Arc::clone(&table)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.contains(id) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        monitor.stop();
        assert!(!table.contains(id));
        assert_eq!(table.cursor_info().timed_out, 1);
    }

    #[test]
    fn test_stop_joins_thread() {
        let table = Arc::new(ClientCursorTable::new(CursorConfig::default()));
        let monitor = CursorMonitor::start(table).unwrap();
        monitor.sweep_now();
        monitor.stop();
    }
}
