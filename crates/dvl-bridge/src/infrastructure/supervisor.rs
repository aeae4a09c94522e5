//! Supervisor: the one task that owns the sensor connection.
//!
//! The supervisor runs the bridge's main loop.  Each iteration waits for the
//! next tick of the loop timer (10 Hz by default), reads the next frame, and
//! dispatches it together with any further frames the same socket read
//! already completed.
//!
//! Commands from the [`CommandRelay`] arrive on a mailbox and are written as
//! soon as the supervisor sees them: while it waits for a tick, and while it
//! waits for the sensor to send something.  A quiet sensor therefore never
//! holds a command back.  The one place commands wait is re-establishment:
//! a connect and configuration handshake always runs to completion first.
//!
//! Because only this task ever touches the [`SensorLink`], a command can
//! never be written halfway through a reconnect, and two writers can never
//! interleave on the socket.
//!
//! [`CommandRelay`]: crate::application::CommandRelay

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::application::{Dispatcher, TelemetrySink};
use crate::domain::BridgeConfig;
use crate::infrastructure::link::{Connector, LinkSettings, SensorLink};

pub struct Supervisor<C: Connector> {
    link: SensorLink<C>,
    dispatcher: Dispatcher,
    mailbox: mpsc::Receiver<String>,
    mailbox_open: bool,
    loop_period: Duration,
}

impl<C: Connector> Supervisor<C> {
    /// Wires a link and dispatcher from `config`.
    ///
    /// `mailbox` is the receiving end of the relay's command channel.
    pub fn new(
        config: &BridgeConfig,
        connector: C,
        sink: Arc<dyn TelemetrySink>,
        mailbox: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            link: SensorLink::new(connector, LinkSettings::from(config)),
            dispatcher: Dispatcher::new(sink, config.log_raw, config.frame_id.clone()),
            mailbox,
            mailbox_open: true,
            loop_period: config.loop_period(),
        }
    }

    pub fn link(&self) -> &SensorLink<C> {
        &self.link
    }

    /// Runs the read→dispatch loop forever.  The first iteration connects
    /// and configures the sensor.
    ///
    /// Dropping the future is safe at any await point; call
    /// [`Supervisor::close`] afterwards to shut the socket down.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.loop_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Commands are still served while waiting for the tick.
            self.wait_for_tick(&mut ticker).await;

            let frame = self.read_frame().await;
            self.dispatcher.dispatch(&frame);

            // One socket read can complete several frames.  Dispatch them all
            // now rather than one per tick, or a burst would sit in the queue
            // and fall further behind the sensor with every tick.
            while let Some(frame) = self.link.take_frame() {
                self.dispatcher.dispatch(&frame);
            }
        }
    }

    /// Returns the next frame, reconnecting as often as needed.
    ///
    /// Never fails.  A read timeout, EOF or socket error drops the
    /// connection, and the link is re-established (connect plus handshake)
    /// before reading again.  Frames completed before the loss are returned
    /// first, in order.
    pub async fn read_frame(&mut self) -> String {
        loop {
            // Frames completed before a connection loss are still valid and
            // come first.
            if let Some(frame) = self.link.take_frame() {
                return frame;
            }

            // No stream: connect and configure.  `establish` only returns
            // once a connection is up, whatever the handshake outcome.
            if !self.link.is_connected() {
                self.link.establish().await;
                continue;
            }

            // Race the mailbox against the sensor.  `biased` checks the
            // mailbox first so a command is never starved by a chatty sensor.
            //
            // When a command wins, the read future is dropped.  That is safe:
            // `recv_frame` feeds the framer before it can yield again, so no
            // bytes are lost, and the link remembers the read deadline, so
            // a stream of commands cannot keep a dead sensor looking alive.
            tokio::select! {
                biased;

                command = self.mailbox.recv(), if self.mailbox_open => {
                    self.handle_command(command).await;
                }

                result = self.link.recv_frame() => match result {
                    Ok(frame) => return frame,
                    Err(e) => {
                        error!(
                            generation = self.link.generation(),
                            "lost connection with DVL, reinitiating: {e}"
                        );
                        // Drop the stream only.  The next pass through the
                        // loop re-establishes it, and the framer's carry is
                        // kept so a half-received frame can still complete.
                        self.link.mark_lost();
                    }
                },
            }
        }
    }

    async fn wait_for_tick(&mut self, ticker: &mut Interval) {
        loop {
            tokio::select! {
                biased;

                command = self.mailbox.recv(), if self.mailbox_open => {
                    self.handle_command(command).await;
                }

                _ = ticker.tick() => return,
            }
        }
    }

    async fn handle_command(&mut self, command: Option<String>) {
        let Some(line) = command else {
            debug!("command mailbox closed; no further commands will be relayed");
            self.mailbox_open = false;
            return;
        };

        // A command that arrives while the link is down goes to the next
        // connection, after its configuration handshake.
        if !self.link.is_connected() {
            self.link.establish().await;
        }
        // On failure `write_line` has already dropped the stream; the next
        // read reconnects.  The command itself is not retried.
        match self.link.write_line(&line).await {
            Ok(()) => info!(
                generation = self.link.generation(),
                "sent command to DVL: {}",
                line.trim_end()
            ),
            Err(e) => error!("failed to send command to DVL: {e}"),
        }
    }

    /// Closes the connection.  Call after the `run` future has been dropped.
    pub async fn close(&mut self) {
        self.link.close().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
