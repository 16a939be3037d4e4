//! Single-threaded driver for the pairing state machine.
//!
//! The reactor owns the machine and serializes every input to it: link
//! frames, operator commands, timer expiries and the heartbeat tick. After
//! each input it applies the timer requests the machine queued and forwards
//! its signals to the rest of the device.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pairing::{PairingSignal, PairingStateMachine, TimerCommand, TimerKind};
use crate::services::DeviceServices;
use crate::transport::{LinkEvent, RtsTransport};

/// Inputs accepted by the reactor.
#[derive(Debug)]
pub enum ReactorEvent {
    /// Raw bytes from the link, opened by the transport.
    Frame(Vec<u8>),
    /// An event the link adapter already classified.
    Link(LinkEvent),
    StartPairing,
    StopPairing,
    SetPairingMode(bool),
    SetOtaInProgress(bool),
    Shutdown,
}

pub struct Reactor<T: RtsTransport, S: DeviceServices> {
    machine: PairingStateMachine<T, S>,
    events: mpsc::Receiver<ReactorEvent>,
    signals: mpsc::UnboundedSender<PairingSignal>,
    deadlines: HashMap<TimerKind, (Instant, u64)>,
}

impl<T: RtsTransport, S: DeviceServices> Reactor<T, S> {
    pub fn new(
        machine: PairingStateMachine<T, S>,
        events: mpsc::Receiver<ReactorEvent>,
        signals: mpsc::UnboundedSender<PairingSignal>,
    ) -> Self {
        Self { machine, events, signals, deadlines: HashMap::new() }
    }

    /// Run until [`ReactorEvent::Shutdown`] or every sender is dropped, then
    /// hand the machine back.
    pub async fn run(mut self) -> PairingStateMachine<T, S> {
        let mut heartbeat = time::interval(self.machine.config().heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("pairing reactor started");

        loop {
            self.flush();
            let next = self.next_deadline();
            tokio::select! {
                event = self.events.recv() => match event {
                    None | Some(ReactorEvent::Shutdown) => break,
                    Some(event) => self.apply(event),
                },
                _ = sleep_until(next) => self.fire_due_timers(),
                _ = heartbeat.tick() => self.machine.heartbeat(),
            }
        }

        self.flush();
        info!("pairing reactor stopped");
        self.machine
    }

    fn apply(&mut self, event: ReactorEvent) {
        match event {
            ReactorEvent::Frame(frame) => {
                let event = self.machine.transport_mut().open_frame(frame);
                self.machine.handle_link_event(event);
            }
            ReactorEvent::Link(event) => self.machine.handle_link_event(event),
            ReactorEvent::StartPairing => {
                if let Err(e) = self.machine.start_pairing() {
                    warn!(error = %e, "pairing not started");
                }
            }
            ReactorEvent::StopPairing => self.machine.stop_pairing(),
            ReactorEvent::SetPairingMode(active) => self.machine.set_pairing_mode(active),
            ReactorEvent::SetOtaInProgress(running) => self.machine.set_ota_in_progress(running),
            ReactorEvent::Shutdown => {}
        }
    }

    fn flush(&mut self) {
        for command in self.machine.drain_timers() {
            match command {
                TimerCommand::Start { kind, after, generation } => {
                    self.deadlines.insert(kind, (Instant::now() + after, generation));
                }
                TimerCommand::Cancel(kind) => {
                    self.deadlines.remove(&kind);
                }
            }
        }
        for signal in self.machine.drain_signals() {
            if self.signals.send(signal).is_err() {
                debug!("signal receiver gone, dropping signal");
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().map(|(at, _)| *at).min()
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let due: Vec<(TimerKind, u64)> = self
            .deadlines
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(kind, (_, generation))| (*kind, *generation))
            .collect();
        for (kind, generation) in due {
            self.deadlines.remove(&kind);
            self.machine.on_timer(kind, generation);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::harness::{drive_to_confirmed, encrypted, test_machine, TestMachine};
    use crate::pairing::Phase;
    use crate::store::MemoryKeyStorage;
    use swb_proto::rts::WifiConnectRequest;
    use swb_proto::RtsMessage;

    fn spawn(
        machine: TestMachine,
    ) -> (
        mpsc::Sender<ReactorEvent>,
        mpsc::UnboundedReceiver<PairingSignal>,
        tokio::task::JoinHandle<TestMachine>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Reactor::new(machine, rx, signal_tx).run());
        (tx, signal_rx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_times_out() {
        let (machine, _) = test_machine(MemoryKeyStorage::new());
        let (tx, mut signals, handle) = spawn(machine);
        let started = Instant::now();

        tx.send(ReactorEvent::StartPairing).await.unwrap();
        let signal = signals.recv().await.unwrap();

        assert_eq!(signal, PairingSignal::Reset { forced: false });
        assert!(started.elapsed() >= Duration::from_secs(60));
        tx.send(ReactorEvent::Shutdown).await.unwrap();
        let machine = handle.await.unwrap();
        assert_eq!(machine.phase(), Phase::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_pairing_is_forced_reset() {
        let (machine, _) = test_machine(MemoryKeyStorage::new());
        let (tx, mut signals, handle) = spawn(machine);

        tx.send(ReactorEvent::SetPairingMode(true)).await.unwrap();
        tx.send(ReactorEvent::StartPairing).await.unwrap();
        tx.send(ReactorEvent::StopPairing).await.unwrap();

        assert_eq!(signals.recv().await.unwrap(), PairingSignal::Reset { forced: true });
        drop(tx);
        let machine = handle.await.unwrap();
        assert_eq!(machine.phase(), Phase::Initial);
        assert!(machine.is_pairing_mode_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wifi_connect_poll_runs_on_timer() {
        let (mut machine, _) = test_machine(MemoryKeyStorage::new());
        drive_to_confirmed(&mut machine);
        machine.drain_signals();
        machine.drain_timers();
        machine.transport_mut().take_sent();
        let (tx, _signals, handle) = spawn(machine);

        tx.send(ReactorEvent::Link(encrypted(&RtsMessage::WifiConnectRequest(
            WifiConnectRequest { ssid: b"home".to_vec(), timeout_secs: 3, ..Default::default() },
        ))))
        .await
        .unwrap();
        time::sleep(Duration::from_secs(5)).await;
        tx.send(ReactorEvent::Shutdown).await.unwrap();

        let machine = handle.await.unwrap();
        let polls = machine.services().calls.iter().filter(|c| **c == "wifi_status").count();
        assert_eq!(polls, 4);
        assert!(machine
            .transport()
            .sent_messages()
            .iter()
            .any(|(_, msg)| matches!(msg, RtsMessage::WifiConnectResponse(_))));
    }
}
