//! Conversation controller: owns the session and transcript and routes
//! every input to onboarding or the interview.
//!
//! All gateway traffic goes through one slot: `dispatch` turns an input
//! event into a `PendingCall`, the caller awaits it, and `apply` folds the
//! reply back in (possibly chaining the next call, e.g. interview-start right
//! after onboarding finishes). While a call is pending every other input is
//! rejected, so replies can never arrive out of order.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

use crate::error::GatewayError;
use crate::gateway::{
    AnswerReply, CandidatePayload, Gateway, InterviewStart, InterviewStartRequest, OnboardingReply,
    OnboardingStart, ResendReply, VerificationMetadata,
};
use crate::onboarding::{
    Candidate, ResendRefusal, Session, Stage, TimerEvent, VerificationHandler, VerificationUpdate,
};
use crate::transcript::{Sender, Transcript};

use super::events::{Notification, RejectReason, UiEvent};

/// Notification broadcast capacity.
const NOTIFICATION_CAPACITY: usize = 256;

const TRANSPORT_NOTICE: &str = "An error occurred. Please try again.";
const SESSION_ENDED: &str = "This session has ended.";

/// A gateway call in flight, resolving to the reply to apply next.
pub type PendingCall = BoxFuture<'static, GatewayReply>;

/// The outcome of one gateway call, tagged by operation.
#[derive(Debug)]
pub enum GatewayReply {
    OnboardingStarted(Result<OnboardingStart, GatewayError>),
    OnboardingContinued(Result<OnboardingReply, GatewayError>),
    CodeResent(Result<ResendReply, GatewayError>),
    InterviewStarted(Result<InterviewStart, GatewayError>),
    AnswerSubmitted(Result<AnswerReply, GatewayError>),
}

/// Gateway operations, for logging and busy tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    OnboardingStart,
    OnboardingContinue,
    OnboardingResend,
    InterviewStart,
    InterviewSubmit,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OnboardingStart => "onboarding-start",
            Self::OnboardingContinue => "onboarding-continue",
            Self::OnboardingResend => "onboarding-resend",
            Self::InterviewStart => "interview-start",
            Self::InterviewSubmit => "interview-submit",
        };
        write!(f, "{s}")
    }
}

/// Top-level conversation state machine.
pub struct Controller {
    session: Session,
    transcript: Transcript,
    verification: VerificationHandler,
    gateway: Arc<dyn Gateway>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    notify_tx: broadcast::Sender<Notification>,
    in_flight: Option<Operation>,
    input_enabled: bool,
    /// Last input state published, to avoid repeating identical updates.
    published_input: (bool, &'static str),
}

impl Controller {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (notify_tx, _rx) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            session: Session::new(),
            transcript: Transcript::new(),
            verification: VerificationHandler::new(timer_tx),
            gateway,
            timer_rx,
            notify_tx,
            in_flight: None,
            input_enabled: false,
            published_input: (false, Stage::Onboarding.placeholder()),
        }
    }

    /// Subscribe to render notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stage(&self) -> Stage {
        self.session.stage()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn verification(&self) -> &VerificationHandler {
        &self.verification
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    // ── Driving the conversation ─────────────────────────────────────────

    /// Open onboarding and wait for the greeting.
    pub async fn begin_onboarding(&mut self) {
        if let Some(call) = self.start_onboarding() {
            self.drive(call).await;
        }
    }

    /// Skip onboarding and open the interview for a known candidate.
    pub async fn begin_interview(&mut self, candidate: Candidate) {
        if let Some(call) = self.start_interview(candidate) {
            self.drive(call).await;
        }
    }

    /// Send one line of user input and wait for the outcome.
    pub async fn submit_user_message(&mut self, text: &str) {
        self.handle(UiEvent::UserSubmitted(text.to_string())).await;
    }

    /// Ask for a new verification code and wait for the outcome.
    pub async fn request_resend(&mut self) {
        self.handle(UiEvent::ResendRequested).await;
    }

    /// Dispatch an event and await every call it leads to.
    pub async fn handle(&mut self, event: UiEvent) {
        if let Some(call) = self.dispatch(event) {
            self.drive(call).await;
        }
    }

    /// Await a call, applying its reply and any call chained after it.
    pub async fn drive(&mut self, call: PendingCall) {
        let mut next = Some(call);
        while let Some(call) = next.take() {
            let reply = call.await;
            next = self.apply(reply);
        }
    }

    /// Run the single-threaded event loop until the session ends or the
    /// input channel closes. Returns the final stage.
    pub async fn run(
        &mut self,
        first: Option<PendingCall>,
        mut events: mpsc::Receiver<UiEvent>,
    ) -> Stage {
        enum Step {
            Reply(GatewayReply),
            Input(Option<UiEvent>),
            Timer(TimerEvent),
        }

        let mut pending = first;
        loop {
            if pending.is_none() && self.stage().is_terminal() {
                break;
            }

            let step = tokio::select! {
                reply = async {
                    match pending.as_mut() {
                        Some(call) => call.await,
                        None => std::future::pending().await,
                    }
                }, if pending.is_some() => Step::Reply(reply),
                event = events.recv() => Step::Input(event),
                Some(timer) = self.timer_rx.recv() => Step::Timer(timer),
            };

            match step {
                Step::Reply(reply) => pending = self.apply(reply),
                Step::Input(Some(event)) => {
                    if let Some(call) = self.dispatch(event) {
                        pending = Some(call);
                    }
                }
                Step::Input(None) => {
                    tracing::info!(run_id = %self.session.run_id, "Input closed");
                    break;
                }
                Step::Timer(event) => self.on_timer(event),
            }
        }
        self.stage()
    }

    /// Apply every timer event already queued. Returns how many were seen.
    pub fn process_pending_timers(&mut self) -> usize {
        let mut seen = 0;
        while let Ok(event) = self.timer_rx.try_recv() {
            self.on_timer(event);
            seen += 1;
        }
        seen
    }

    // ── Issuing calls ────────────────────────────────────────────────────

    /// Issue onboarding-start. `None` if already started or busy.
    pub fn start_onboarding(&mut self) -> Option<PendingCall> {
        if self.in_flight.is_some()
            || self.session.onboarding_session_id.is_some()
            || self.session.handoff().is_some()
            || self.stage() != Stage::Onboarding
        {
            tracing::warn!(stage = %self.stage(), "Onboarding already under way");
            return None;
        }
        Some(self.call_start_onboarding())
    }

    /// Issue interview-start directly, skipping onboarding.
    pub fn start_interview(&mut self, candidate: Candidate) -> Option<PendingCall> {
        if self.in_flight.is_some() || !self.stage().is_onboarding() {
            tracing::warn!(stage = %self.stage(), "Cannot start interview now");
            return None;
        }
        if !candidate.is_usable() {
            self.terminate(Some("The candidate profile is incomplete. This session has ended."));
            return None;
        }
        self.session.begin_handoff(candidate.clone());
        Some(self.call_start_interview(&candidate))
    }

    /// Turn an input event into a gateway call, or reject it.
    pub fn dispatch(&mut self, event: UiEvent) -> Option<PendingCall> {
        match event {
            UiEvent::UserSubmitted(text) => self.dispatch_message(&text),
            UiEvent::ResendRequested => self.dispatch_resend(),
        }
    }

    fn dispatch_message(&mut self, text: &str) -> Option<PendingCall> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.in_flight.is_some() {
            return self.reject(RejectReason::Busy);
        }
        if !self.input_enabled {
            return self.reject(RejectReason::InputDisabled);
        }

        // A verified candidate whose interview-start failed: retry it.
        if let Some(candidate) = self.session.handoff().cloned() {
            self.append(Sender::User, text);
            return Some(self.call_start_interview(&candidate));
        }

        match self.stage() {
            Stage::Onboarding | Stage::AwaitingVerificationCode => {
                let Some(id) = self.session.onboarding_session_id.clone() else {
                    return self.reject(RejectReason::InputDisabled);
                };
                self.append(Sender::User, text);
                Some(self.call_continue_onboarding(id, text.to_string()))
            }
            Stage::InterviewActive => {
                let Some(id) = self.session.interview_session_id.clone() else {
                    return self.reject(RejectReason::InputDisabled);
                };
                self.append(Sender::User, text);
                Some(self.call_submit_answer(id, text.to_string()))
            }
            Stage::Complete | Stage::Terminated => self.reject(RejectReason::InputDisabled),
        }
    }

    fn dispatch_resend(&mut self) -> Option<PendingCall> {
        if self.in_flight.is_some() {
            return self.reject(RejectReason::Busy);
        }
        if self.stage() != Stage::AwaitingVerificationCode {
            return self.reject(RejectReason::ResendUnavailable);
        }
        match self.verification.check_resend() {
            Ok(()) => {}
            Err(ResendRefusal::NotAwaitingCode) => {
                return self.reject(RejectReason::ResendUnavailable);
            }
            Err(ResendRefusal::CoolingDown { remaining }) => {
                return self.reject(RejectReason::ResendCoolingDown { remaining });
            }
        }
        let Some(id) = self.session.onboarding_session_id.clone() else {
            return self.reject(RejectReason::ResendUnavailable);
        };
        Some(self.call_resend(id))
    }

    fn call_start_onboarding(&mut self) -> PendingCall {
        let gateway = Arc::clone(&self.gateway);
        self.issue(Operation::OnboardingStart, async move {
            GatewayReply::OnboardingStarted(gateway.start_onboarding().await)
        })
    }

    fn call_continue_onboarding(&mut self, id: String, message: String) -> PendingCall {
        let gateway = Arc::clone(&self.gateway);
        self.issue(Operation::OnboardingContinue, async move {
            GatewayReply::OnboardingContinued(gateway.continue_onboarding(&id, &message).await)
        })
    }

    fn call_resend(&mut self, id: String) -> PendingCall {
        let gateway = Arc::clone(&self.gateway);
        self.issue(Operation::OnboardingResend, async move {
            GatewayReply::CodeResent(gateway.resend_code(&id).await)
        })
    }

    fn call_start_interview(&mut self, candidate: &Candidate) -> PendingCall {
        let gateway = Arc::clone(&self.gateway);
        let request = InterviewStartRequest::from(candidate);
        self.issue(Operation::InterviewStart, async move {
            GatewayReply::InterviewStarted(gateway.start_interview(&request).await)
        })
    }

    fn call_submit_answer(&mut self, id: String, answer: String) -> PendingCall {
        let gateway = Arc::clone(&self.gateway);
        self.issue(Operation::InterviewSubmit, async move {
            GatewayReply::AnswerSubmitted(gateway.submit_answer(&id, &answer).await)
        })
    }

    fn issue<F>(&mut self, operation: Operation, call: F) -> PendingCall
    where
        F: Future<Output = GatewayReply> + Send + 'static,
    {
        tracing::info!(run_id = %self.session.run_id, %operation, "Gateway call issued");
        if self.in_flight.replace(operation).is_none() {
            self.notify(Notification::Busy { busy: true });
        }
        Box::pin(call)
    }

    // ── Applying replies ─────────────────────────────────────────────────

    /// Fold a gateway reply into the session. Returns the next call when the
    /// reply chains one.
    pub fn apply(&mut self, reply: GatewayReply) -> Option<PendingCall> {
        let next = match reply {
            GatewayReply::OnboardingStarted(result) => self.on_onboarding_started(result),
            GatewayReply::OnboardingContinued(result) => self.on_onboarding_continued(result),
            GatewayReply::CodeResent(result) => self.on_code_resent(result),
            GatewayReply::InterviewStarted(result) => self.on_interview_started(result),
            GatewayReply::AnswerSubmitted(result) => self.on_answer_submitted(result),
        };
        if next.is_none() {
            self.in_flight = None;
            self.notify(Notification::Busy { busy: false });
        }
        next
    }

    fn on_onboarding_started(
        &mut self,
        result: Result<OnboardingStart, GatewayError>,
    ) -> Option<PendingCall> {
        match result {
            Ok(start) => {
                tracing::info!(
                    run_id = %self.session.run_id,
                    onboarding_session_id = %start.onboarding_session_id,
                    "Onboarding started"
                );
                self.session.onboarding_session_id = Some(start.onboarding_session_id);
                self.append(Sender::Bot, start.message);
                if start.verification.is_email_code() {
                    self.enter_verification(&start.verification);
                }
                self.set_input_enabled(true);
            }
            Err(err) => {
                // No automatic retry: the controller stays inert.
                tracing::warn!(error = %err, "Onboarding start failed");
                self.append(Sender::Bot, failure_notice(&err));
                if err.is_fatal() || err.is_finished() {
                    self.terminate(None);
                }
            }
        }
        None
    }

    fn on_onboarding_continued(
        &mut self,
        result: Result<OnboardingReply, GatewayError>,
    ) -> Option<PendingCall> {
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.fail(&err);
                return None;
            }
        };

        if let Some(message) = reply.message.filter(|m| !m.trim().is_empty()) {
            self.append(Sender::Bot, message);
        }
        if !reply.finished {
            self.route_verification(&reply.verification);
            return None;
        }

        // Onboarding is over: drop the code clocks but keep the stage until
        // the interview opens, so no intermediate stage is published.
        let updates = self.verification.reset();
        self.apply_updates(updates);

        match reply.candidate.and_then(CandidatePayload::into_candidate) {
            Some(candidate) => {
                tracing::info!(
                    run_id = %self.session.run_id,
                    topic = %candidate.topic,
                    "Onboarding finished, starting interview"
                );
                self.session.begin_handoff(candidate.clone());
                Some(self.call_start_interview(&candidate))
            }
            None => {
                tracing::warn!(run_id = %self.session.run_id, "Onboarding finished without a usable candidate");
                self.terminate(Some(
                    "Onboarding could not be completed. This session has ended.",
                ));
                None
            }
        }
    }

    fn on_code_resent(&mut self, result: Result<ResendReply, GatewayError>) -> Option<PendingCall> {
        match result {
            Ok(reply) => {
                if let Some(message) = reply.message.as_deref().filter(|m| !m.trim().is_empty()) {
                    self.append(Sender::Bot, message);
                }
                if reply.finished {
                    self.terminate(Some(SESSION_ENDED));
                    return None;
                }
                let updates = self.verification.resend_succeeded(&reply);
                self.apply_updates(updates);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Resend failed");
                let updates = self.verification.resend_failed(&err);
                self.apply_updates(updates);
                if err.is_fatal() || err.is_finished() {
                    self.terminate(Some(SESSION_ENDED));
                }
            }
        }
        None
    }

    fn on_interview_started(
        &mut self,
        result: Result<InterviewStart, GatewayError>,
    ) -> Option<PendingCall> {
        let start = match result {
            Ok(start) => start,
            Err(err) => {
                self.fail(&err);
                if !self.stage().is_terminal() {
                    // No code is pending any more.
                    if self.stage() == Stage::AwaitingVerificationCode {
                        self.set_stage(Stage::Onboarding);
                    }
                    // The next message retries interview-start.
                    self.set_input_enabled(true);
                }
                return None;
            }
        };

        let Some(topic) = self.session.handoff().map(|c| c.topic.clone()) else {
            self.fail(&GatewayError::protocol("interview started without a candidate"));
            return None;
        };

        let previous = self.stage();
        if let Err(e) = self.session.promote_to_interview(start.session_id) {
            tracing::warn!(error = %e, "Interview promotion failed");
            self.terminate(Some(SESSION_ENDED));
            return None;
        }
        self.after_stage_change(previous);
        tracing::info!(
            run_id = %self.session.run_id,
            session_id = ?self.session.interview_session_id,
            "Interview started"
        );

        self.append(Sender::Bot, format!("Let's begin. The topic is: {topic}"));
        self.append(Sender::Bot, start.question);
        self.set_input_enabled(true);
        None
    }

    fn on_answer_submitted(
        &mut self,
        result: Result<AnswerReply, GatewayError>,
    ) -> Option<PendingCall> {
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.fail(&err);
                return None;
            }
        };

        let question = reply.question.filter(|q| !q.trim().is_empty());
        let asked = question.is_some();
        if let Some(question) = question {
            self.append(Sender::Bot, question);
        }

        if reply.finished {
            self.set_stage(Stage::Complete);
            self.set_input_enabled(false);
            tracing::info!(run_id = %self.session.run_id, "Interview complete");
        } else if !asked {
            self.fail(&GatewayError::protocol(
                "interview-submit returned neither a question nor finished",
            ));
        }
        None
    }

    // ── Verification substage ────────────────────────────────────────────

    fn route_verification(&mut self, meta: &VerificationMetadata) {
        if meta.is_email_code() {
            self.enter_verification(meta);
        } else if self.stage() == Stage::AwaitingVerificationCode {
            self.set_stage(Stage::Onboarding);
        } else {
            let updates = self.verification.reset();
            self.apply_updates(updates);
        }
    }

    fn enter_verification(&mut self, meta: &VerificationMetadata) {
        if self.stage() == Stage::Onboarding {
            self.set_stage(Stage::AwaitingVerificationCode);
        }
        let updates = self.verification.apply(meta);
        self.apply_updates(updates);
    }

    fn on_timer(&mut self, event: TimerEvent) {
        let updates = self.verification.on_timer(event);
        self.apply_updates(updates);
    }

    fn apply_updates(&mut self, updates: Vec<VerificationUpdate>) {
        for update in updates {
            match update {
                VerificationUpdate::Notice(text) => self.append(Sender::Bot, text),
                VerificationUpdate::Resend(control) => {
                    self.notify(Notification::Resend { control });
                }
                VerificationUpdate::Expiry(status) => {
                    self.notify(Notification::Expiry { status });
                }
            }
        }
    }

    // ── Stage, input and transcript bookkeeping ──────────────────────────

    fn set_stage(&mut self, target: Stage) {
        match self.session.transition_to(target) {
            Ok(previous) => self.after_stage_change(previous),
            Err(e) => tracing::warn!(error = %e, "Ignoring stage change"),
        }
    }

    fn after_stage_change(&mut self, previous: Stage) {
        let stage = self.stage();
        tracing::info!(run_id = %self.session.run_id, from = %previous, to = %stage, "Stage changed");
        if stage != Stage::AwaitingVerificationCode {
            let updates = self.verification.reset();
            self.apply_updates(updates);
        }
        self.notify(Notification::StageChanged { stage });
        self.publish_input();
    }

    /// Record a failed call. Protocol violations and errors flagged as
    /// finished end the session; everything else leaves the stage alone.
    fn fail(&mut self, err: &GatewayError) {
        tracing::warn!(run_id = %self.session.run_id, error = %err, "Gateway call failed");
        self.append(Sender::Bot, failure_notice(err));
        if err.is_fatal() || err.is_finished() {
            self.terminate(None);
        }
    }

    fn terminate(&mut self, notice: Option<&str>) {
        if let Some(notice) = notice {
            self.append(Sender::Bot, notice);
        }
        if !self.stage().is_terminal() {
            self.set_stage(Stage::Terminated);
        }
        self.set_input_enabled(false);
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        self.publish_input();
    }

    fn publish_input(&mut self) {
        let stage = self.stage();
        // A finished session never advertises input, whatever the flag says.
        let current = (self.input_enabled && !stage.is_terminal(), stage.placeholder());
        if current != self.published_input {
            self.published_input = current;
            self.notify(Notification::InputChanged {
                enabled: current.0,
                placeholder: current.1.to_string(),
            });
        }
    }

    fn append(&mut self, sender: Sender, text: impl Into<String>) {
        self.transcript.append(sender, text);
        if let Some(message) = self.transcript.last().cloned() {
            self.notify(Notification::MessageAppended { message });
        }
    }

    fn reject(&mut self, reason: RejectReason) -> Option<PendingCall> {
        tracing::debug!(%reason, stage = %self.stage(), "Input rejected");
        self.notify(Notification::InputRejected { reason });
        None
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notify_tx.send(notification);
    }
}

fn failure_notice(err: &GatewayError) -> String {
    match err {
        GatewayError::Transport(_) => TRANSPORT_NOTICE.to_string(),
        GatewayError::Server { message, .. } => format!("Error: {message}"),
        GatewayError::Protocol(detail) => {
            format!("Something went wrong ({detail}). {SESSION_ENDED}")
        }
    }
}
