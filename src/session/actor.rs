use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExecutionView, SessionCommand, SessionContext};
use crate::error::TransportError;
use crate::execution::{Execution, ExecutionSnapshot};
use crate::pacer::{LogBook, LogPacer};
use crate::reducer::{
    reduce, ConversationMessageState, Effect, Phase, ReducerInput, TransportSource,
};
use crate::transport::{AgentSubscription, CancelAck, ChannelMessage, ExecutionApi};

type PollOutcome = Result<ExecutionSnapshot, TransportError>;
type CancelOutcome = Result<CancelAck, TransportError>;

struct Poller {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Poller {
    fn spawn(
        api: Arc<dyn ExecutionApi>,
        execution_id: String,
        interval: std::time::Duration,
        tx: mpsc::Sender<PollOutcome>,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let outcome = api.fetch_snapshot(&execution_id).await;
                if token.is_cancelled() || tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });
        Self { stop, task }
    }

    fn stop(self) {
        self.stop.cancel();
        self.task.abort();
    }
}

pub(super) struct SessionActor {
    id: Uuid,
    ctx: SessionContext,
    agent_id: String,
    execution_id: String,
    state: ConversationMessageState,
    log: LogBook,
    pacer: LogPacer,
    subscription: Option<AgentSubscription>,
    poller: Option<Poller>,
    polling_stopped: bool,
    poll_tx: mpsc::Sender<PollOutcome>,
    poll_rx: mpsc::Receiver<PollOutcome>,
    cancel_tx: mpsc::Sender<CancelOutcome>,
    cancel_rx: mpsc::Receiver<CancelOutcome>,
    cancel_deadline: Option<Instant>,
    tool_grace_deadline: Option<Instant>,
    tools_visible: bool,
    finished: bool,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: CancellationToken,
    view_tx: watch::Sender<ExecutionView>,
}

impl SessionActor {
    pub(super) fn new(
        id: Uuid,
        ctx: SessionContext,
        agent_id: String,
        execution_id: String,
        commands: mpsc::Receiver<SessionCommand>,
        shutdown: CancellationToken,
    ) -> (Self, watch::Receiver<ExecutionView>) {
        let (poll_tx, poll_rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = mpsc::channel(2);
        let (view_tx, view_rx) =
            watch::channel(ExecutionView::pending(id, &execution_id, &agent_id));
        let log = LogBook::new(ctx.settings.log_max_lines);

        let mut actor = Self {
            id,
            ctx,
            agent_id,
            execution_id,
            state: ConversationMessageState::default(),
            log,
            pacer: LogPacer::default(),
            subscription: None,
            poller: None,
            polling_stopped: false,
            poll_tx,
            poll_rx,
            cancel_tx,
            cancel_rx,
            cancel_deadline: None,
            tool_grace_deadline: None,
            tools_visible: true,
            finished: false,
            commands,
            shutdown,
            view_tx,
        };
        actor.apply(ReducerInput::Attach {
            execution_id: actor.execution_id.clone(),
            agent_id: Some(actor.agent_id.clone()),
        });
        actor.publish();
        (actor, view_rx)
    }

    pub(super) async fn run(mut self) {
        info!(
            session_id = %self.id,
            execution_id = %self.execution_id,
            agent_id = %self.agent_id,
            "Session started"
        );
        self.attach_subscription();
        self.start_polling();
        self.publish();

        let mut ticks = LogPacer::interval(self.ctx.settings.log_pace);
        loop {
            let backlog = !self.pacer.caught_up(self.log.total());
            let cancel_deadline = self.cancel_deadline;
            let grace_deadline = self.tool_grace_deadline;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Cancel) => self.cancel(),
                        Some(SessionCommand::Resubscribe) => self.resubscribe(),
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
                message = next_message(&mut self.subscription) => self.on_channel_message(message),
                Some(outcome) = self.poll_rx.recv() => self.on_poll(outcome),
                Some(outcome) = self.cancel_rx.recv() => self.on_cancel_ack(outcome),
                _ = ticks.tick(), if backlog => {
                    self.pacer.tick(self.log.total());
                }
                _ = sleep_until(cancel_deadline.unwrap_or_else(Instant::now)), if cancel_deadline.is_some() => {
                    self.on_cancel_deadline();
                }
                _ = sleep_until(grace_deadline.unwrap_or_else(Instant::now)), if grace_deadline.is_some() => {
                    self.tool_grace_deadline = None;
                    self.tools_visible = false;
                }
            }

            self.check_drained();
            self.publish();
        }

        self.teardown();
    }

    fn apply(&mut self, input: ReducerInput) {
        let effects = reduce(&mut self.state, input, Utc::now());
        for effect in effects {
            match effect {
                Effect::StopPolling => self.stop_polling(),
                Effect::Log(line) => {
                    self.log.push(&line);
                }
                Effect::TerminalReached(status) => {
                    self.tool_grace_deadline = Some(Instant::now() + self.ctx.settings.tool_grace);
                    self.cancel_deadline = None;
                    if self.state.cancel_requested() {
                        self.release_subscription("cancel confirmed");
                    }
                    debug!("Session {} observed terminal status {}", self.id, status);
                }
                Effect::Finished => self.finish(),
            }
        }
    }

    fn on_channel_message(&mut self, message: Result<ChannelMessage, RecvError>) {
        match message {
            Ok(ChannelMessage::Connected) => {
                self.apply(ReducerInput::TransportRecovered(TransportSource::Stream))
            }
            Ok(ChannelMessage::Event(event)) => self.apply(ReducerInput::Event(event)),
            Ok(ChannelMessage::Disconnected { reason }) => {
                warn!(execution_id = %self.execution_id, "Event stream disconnected: {}", reason);
                // The pump has ended.
                self.release_subscription("event stream disconnected");
                self.apply(ReducerInput::TransportFailed {
                    source: TransportSource::Stream,
                    message: format!("Event stream disconnected: {}", reason),
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    execution_id = %self.execution_id,
                    "Session lagged behind event stream, {} events skipped",
                    skipped
                );
                self.request_snapshot();
            }
            Err(RecvError::Closed) => {
                self.subscription = None;
                self.apply(ReducerInput::TransportFailed {
                    source: TransportSource::Stream,
                    message: "Event stream closed".to_string(),
                });
            }
        }
    }

    fn on_poll(&mut self, outcome: PollOutcome) {
        match outcome {
            Ok(snapshot) => self.apply(ReducerInput::Snapshot(snapshot)),
            Err(err) => {
                warn!(execution_id = %self.execution_id, "Poll failed: {}", err);
                self.apply(ReducerInput::TransportFailed {
                    source: TransportSource::Poll,
                    message: format!("Poll failed: {}", err),
                });
            }
        }
    }

    fn cancel(&mut self) {
        if self.state.phase().is_settled() {
            debug!("Execution {} already terminal; not cancelling", self.execution_id);
            return;
        }
        if self.state.cancel_requested() {
            return;
        }
        self.apply(ReducerInput::CancelRequested);
        info!(execution_id = %self.execution_id, "Cancelling execution");

        let api = Arc::clone(&self.ctx.api);
        let execution_id = self.execution_id.clone();
        let tx = self.cancel_tx.clone();
        tokio::spawn(async move {
            let outcome = api.cancel(&execution_id).await;
            let _ = tx.send(outcome).await;
        });
        self.cancel_deadline = Some(Instant::now() + self.ctx.settings.cancel_confirm_timeout);
    }

    fn on_cancel_ack(&mut self, outcome: CancelOutcome) {
        match outcome {
            Ok(ack) if ack.accepted => {
                self.log.push("Cancel accepted by server");
            }
            Ok(ack) => {
                let detail = ack.message.unwrap_or_else(|| "already finished".to_string());
                self.log.push(&format!("Nothing to cancel: {}", detail));
                self.request_snapshot();
            }
            Err(err) => {
                warn!(execution_id = %self.execution_id, "Cancel request failed: {}", err);
                self.log.push(&format!("Cancel request failed: {}", err));
            }
        }
    }

    fn on_cancel_deadline(&mut self) {
        self.cancel_deadline = None;
        if self.state.phase().is_settled() {
            return;
        }
        self.log.push(&format!(
            "No cancel confirmation after {}s",
            self.ctx.settings.cancel_confirm_timeout.as_secs()
        ));
        self.release_subscription("cancel confirmation timed out");
        self.request_snapshot();
    }

    fn attach_subscription(&mut self) {
        if let Some(registry) = &self.ctx.registry {
            self.subscription = Some(registry.subscribe(&self.agent_id));
        }
    }

    fn resubscribe(&mut self) {
        if self.ctx.registry.is_none() || self.state.phase().is_settled() {
            return;
        }
        info!(execution_id = %self.execution_id, "Re-subscribing to event stream");
        // Release first so a dead pump is replaced rather than shared.
        self.subscription = None;
        self.attach_subscription();
    }

    fn release_subscription(&mut self, reason: &str) {
        if self.subscription.take().is_some() {
            info!(execution_id = %self.execution_id, "Released event subscription: {}", reason);
        }
    }

    fn start_polling(&mut self) {
        if self.polling_stopped || self.poller.is_some() || self.state.phase().is_settled() {
            return;
        }
        info!(
            execution_id = %self.execution_id,
            interval_ms = self.ctx.settings.poll_interval.as_millis() as u64,
            "Polling started"
        );
        self.poller = Some(Poller::spawn(
            Arc::clone(&self.ctx.api),
            self.execution_id.clone(),
            self.ctx.settings.poll_interval,
            self.poll_tx.clone(),
        ));
    }

    fn stop_polling(&mut self) {
        self.polling_stopped = true;
        if let Some(poller) = self.poller.take() {
            poller.stop();
            info!(execution_id = %self.execution_id, "Polling stopped");
        }
    }

    /// One out-of-band fetch, used to backfill after lag or an unconfirmed cancel.
    fn request_snapshot(&mut self) {
        if self.state.phase().is_settled() {
            return;
        }
        let api = Arc::clone(&self.ctx.api);
        let execution_id = self.execution_id.clone();
        let tx = self.poll_tx.clone();
        tokio::spawn(async move {
            let outcome = api.fetch_snapshot(&execution_id).await;
            let _ = tx.send(outcome).await;
        });
    }

    fn check_drained(&mut self) {
        if self.state.phase() == Phase::Finalizing && self.pacer.caught_up(self.log.total()) {
            self.apply(ReducerInput::LogsDrained);
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let execution = self.current_execution();
        info!(
            execution_id = %execution.id,
            status = %execution.status,
            "Execution finished; notifying completion sink"
        );
        let sink = Arc::clone(&self.ctx.sink);
        tokio::spawn(async move {
            sink.execution_finished(execution).await;
        });
    }

    fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.release_subscription("session closed");
        self.publish();
        info!(session_id = %self.id, execution_id = %self.execution_id, "Session closed");
    }

    fn current_execution(&self) -> Execution {
        self.state
            .execution()
            .unwrap_or_else(|| Execution::new(self.execution_id.clone(), Some(self.agent_id.clone())))
    }

    fn build_view(&self) -> ExecutionView {
        let printed = self.pacer.printed();
        ExecutionView {
            session_id: self.id,
            execution: self.current_execution(),
            phase: self.state.phase(),
            is_running: self.state.is_running(),
            cancel_requested: self.state.cancel_requested(),
            response_streaming: self.state.response().is_streaming(),
            reasoning_streaming: self.state.reasoning().is_streaming(),
            active_tools: self.state.tools().active().to_vec(),
            tools_visible: self.tools_visible,
            status_message: self.state.status_message().map(str::to_string),
            transport_error: self.state.transport_error().map(str::to_string),
            stream_error: self.state.stream_error().map(str::to_string),
            poll_error: self.state.poll_error().map(str::to_string),
            log_lines: self.log.printed_lines(printed),
            printed_count: printed,
            total_lines: self.log.total(),
            subscribed: self.subscription.is_some(),
            polling: self.poller.is_some(),
            finished: self.finished,
        }
    }

    fn publish(&self) {
        let view = self.build_view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

async fn next_message(
    subscription: &mut Option<AgentSubscription>,
) -> Result<ChannelMessage, RecvError> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
