//! The session actor.
//!
//! One task per terminal owns the transport, timers, input slots, EMV flow
//! and every unresolved responder. Commands from [`DeviceSession`] handles
//! are processed in order.
//!
//! Request/reply exchanges run inline: the actor sends, then reads until the
//! expected reply arrives or the non-user-input timer fires. Unrelated
//! messages read during an exchange are queued and handled afterwards in
//! arrival order, so user-input and keep-alive expiry are only observed
//! between exchanges.
//!
//! [`DeviceSession`]: crate::DeviceSession

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use poi_core::{
    Amount, DeviceConnectionInfo, DeviceInfo, DeviceSetupResult, EntryMode, ErrorCode, PoiError,
    Result, VersionNumber,
};
use poi_hardware::Transport;
use poi_protocol::{DeviceMessage, MessageId, TagCollection};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::emv::{
    AuthorizationOutcome, AuthorizationRequest, AuthorizationResponse, EmvFlow, EmvState,
    EmvTransactionRequest,
};
use crate::input::{self, ActiveInput, CardInputRequest, InputKind, InputRequest, InputSlots};
use crate::pending::Responder;
use crate::printer::{BarcodeRequest, PrintJob, print_status_error};
use crate::session::{SessionEvent, Shared, lock};
use crate::timer::{TimerKind, TimerSet};

/// Prompt shown while waiting for the card of an EMV transaction.
const EMV_CARD_PROMPT: &str = "INSERT OR TAP CARD";

/// Deadline used when no timer is armed.
const IDLE_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) enum Command {
    Connect {
        info: DeviceConnectionInfo,
        responder: Responder<DeviceSetupResult>,
    },
    Initialize(Responder<DeviceInfo>),
    Disconnect(Responder<()>),
    EnableInput {
        message: DeviceMessage,
        input: ActiveInput,
    },
    CancelInput {
        kind: InputKind,
        responder: Responder<()>,
    },
    StartEmv {
        request: EmvTransactionRequest,
        responder: Responder<AuthorizationRequest>,
    },
    SubmitAuthorization {
        response: AuthorizationResponse,
        responder: Responder<AuthorizationOutcome>,
    },
    CancelTransaction(Responder<()>),
    Print {
        job: PrintJob,
        responder: Responder<()>,
    },
    PrintBarcode {
        request: BarcodeRequest,
        responder: Responder<()>,
    },
    Shutdown(Responder<()>),
}

/// Something waiting on the customer. Each owner has its own countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UserInputOwner {
    Input(InputKind),
    /// Waiting for the card of an EMV transaction.
    Emv,
}

fn cancel_failed(error: PoiError) -> PoiError {
    PoiError::with_description(
        ErrorCode::CancelTransactionOnDeviceFailed,
        format!("device reset failed: {error}"),
    )
}

pub(crate) struct SessionActor<T> {
    transport: T,
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    emv_state: watch::Sender<EmvState>,
    timers: TimerSet,
    /// Per-owner deadlines; the `UserInput` timer tracks the earliest.
    user_input_deadlines: HashMap<UserInputOwner, Instant>,
    inputs: InputSlots,
    emv: Option<EmvFlow>,
    emv_start: Option<Responder<AuthorizationRequest>>,
    emv_payment_code: Option<&'static str>,
    backlog: VecDeque<DeviceMessage>,
    heartbeat_outstanding: bool,
    ping_outstanding: bool,
    connection_info: Option<DeviceConnectionInfo>,
}

impl<T: Transport> SessionActor<T> {
    pub(crate) fn new(
        transport: T,
        shared: Arc<Shared>,
        commands: mpsc::Receiver<Command>,
        emv_state: watch::Sender<EmvState>,
    ) -> Self {
        Self {
            transport,
            shared,
            commands,
            emv_state,
            timers: TimerSet::new(),
            user_input_deadlines: HashMap::new(),
            inputs: InputSlots::default(),
            emv: None,
            emv_start: None,
            emv_payment_code: None,
            backlog: VecDeque::new(),
            heartbeat_outstanding: false,
            ping_outstanding: false,
            connection_info: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("session actor running");

        loop {
            if let Some(message) = self.backlog.pop_front() {
                self.on_inbound(message).await;
                continue;
            }

            let linked = self.transport.is_connected();
            // Evaluated even when no timer is armed; the branch is always live.
            let deadline = self
                .timers
                .next_deadline()
                .map_or_else(|| Instant::now() + IDLE_WAIT, |(_, at)| at);

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(responder)) => {
                        self.stop().await;
                        responder.resolve(Ok(()));
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },
                received = self.transport.recv(), if linked => match received {
                    Ok(message) => self.on_inbound(message).await,
                    Err(error) => self.teardown(error, true).await,
                },
                () = sleep_until(deadline) => self.on_timers().await,
            }
        }

        info!("session actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { info, responder } => {
                let result = self.connect(info).await;
                *lock(&self.shared.setup_result) = Some(result.clone());
                self.shared.connecting.store(false, Ordering::Release);
                responder.resolve(Ok(result));
            }
            Command::Initialize(responder) => {
                let result = self.reinitialize().await;
                responder.resolve(result);
            }
            Command::Disconnect(responder) => {
                if self.transport.is_connected() || self.shared.connected.load(Ordering::Acquire) {
                    self.teardown(PoiError::not_connected(), false).await;
                }
                responder.resolve(Ok(()));
            }
            Command::EnableInput { message, input } => self.enable_input(message, input).await,
            Command::CancelInput { kind, responder } => {
                let result = self.cancel_input(kind).await;
                responder.resolve(result);
            }
            Command::StartEmv { request, responder } => self.start_emv(request, responder).await,
            Command::SubmitAuthorization {
                response,
                responder,
            } => {
                let result = self.submit_authorization(response).await;
                responder.resolve(result);
            }
            Command::CancelTransaction(responder) => {
                let result = self.cancel_transaction().await;
                responder.resolve(result);
            }
            Command::Print { job, responder } => {
                let result = self.print(job).await;
                responder.resolve(result);
            }
            Command::PrintBarcode { request, responder } => {
                let result = self.print_barcode(request).await;
                responder.resolve(result);
            }
            Command::Shutdown(responder) => responder.resolve(Ok(())),
        }
    }

    // Transport helpers

    /// Send one message. A link failure tears the session down.
    async fn send(&mut self, message: DeviceMessage) -> Result<()> {
        debug!(%message, "send");
        match self.transport.send(message).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if error.code() == ErrorCode::BluetoothConnectivity {
                    self.teardown(error.clone(), true).await;
                }
                Err(error)
            }
        }
    }

    /// Send `request` and wait for the reply with id `expect` under the
    /// non-user-input timer.
    async fn exchange(&mut self, request: DeviceMessage, expect: MessageId) -> Result<DeviceMessage> {
        self.send(request).await?;

        let timeout = self.shared.config.non_user_input_timeout();
        self.timers.arm(TimerKind::NonUserInput, timeout);

        let result = loop {
            let Some(deadline) = self.timers.deadline(TimerKind::NonUserInput) else {
                break Err(PoiError::timeout());
            };

            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok(message) if message.id == expect => break Ok(message),
                    Ok(message) => {
                        debug!(%message, "queued during exchange");
                        self.backlog.push_back(message);
                    }
                    Err(error) => {
                        self.teardown(error.clone(), true).await;
                        break Err(error);
                    }
                },
                () = sleep_until(deadline) => {
                    warn!(%expect, timeout_ms = timeout.as_millis() as u64, "device did not reply");
                    break Err(PoiError::timeout());
                }
            }
        };

        self.timers.stop(TimerKind::NonUserInput);
        result
    }

    async fn reset_device(&mut self) -> Result<()> {
        let reply = self
            .exchange(DeviceMessage::new(MessageId::Reset), MessageId::Reset)
            .await?;
        if !reply.is_ok() {
            return Err(PoiError::unknown(format!(
                "reset status {}",
                reply.status().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn publish_emv_state(&self) {
        let state = self.emv.as_ref().map_or(EmvState::Idle, EmvFlow::state);
        let changed = self.emv_state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            self.shared.emit(SessionEvent::EmvStateChanged(state));
        }
    }

    /// Start (or restart) the countdown of `owner`.
    fn arm_user_input(&mut self, owner: UserInputOwner) {
        let deadline = Instant::now() + self.shared.config.user_input_timeout();
        self.user_input_deadlines.insert(owner, deadline);
        self.sync_user_input_timer();
    }

    fn release_user_input(&mut self, owner: UserInputOwner) {
        if self.user_input_deadlines.remove(&owner).is_some() {
            self.sync_user_input_timer();
        }
    }

    fn sync_user_input_timer(&mut self) {
        match self.user_input_deadlines.values().min() {
            Some(&deadline) => self.timers.arm_at(TimerKind::UserInput, deadline),
            None => self.timers.stop(TimerKind::UserInput),
        }
    }

    /// Remove and return the owners whose countdown ended, earliest first.
    fn take_expired_user_inputs(&mut self, now: Instant) -> Vec<UserInputOwner> {
        let mut expired: Vec<(UserInputOwner, Instant)> = self
            .user_input_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(owner, deadline)| (*owner, *deadline))
            .collect();
        expired.sort_by_key(|(_, deadline)| *deadline);
        for (owner, _) in &expired {
            self.user_input_deadlines.remove(owner);
        }
        self.sync_user_input_timer();
        expired.into_iter().map(|(owner, _)| owner).collect()
    }

    // Connection

    async fn connect(&mut self, info: DeviceConnectionInfo) -> DeviceSetupResult {
        info!(device_type = %info.device_type, "connecting to terminal");

        if self.transport.is_connected() {
            self.teardown(PoiError::not_connected(), false).await;
        }

        if let Err(error) = self.transport.connect(&info).await {
            warn!(%error, "terminal connection failed");
            return DeviceSetupResult::failure(info, error);
        }

        self.shared.connected.store(true, Ordering::Release);
        self.connection_info = Some(info.clone());
        self.heartbeat_outstanding = false;
        self.ping_outstanding = false;
        self.shared.emit(SessionEvent::Connected);

        let result = match self.initialize(&info).await {
            Ok(device_info) => DeviceSetupResult::success(info, device_info),
            Err(error) => {
                warn!(%error, "terminal initialization failed");
                DeviceSetupResult::failure(info, error)
            }
        };

        if self.transport.is_connected() {
            self.arm_keepalives();
        }
        result
    }

    /// Unit-data exchange.
    async fn initialize(&mut self, info: &DeviceConnectionInfo) -> Result<DeviceInfo> {
        let request = DeviceMessage::new(MessageId::UnitData).with_fields([
            info.idle_prompt.clone().unwrap_or_default(),
            info.idle_image_name.clone().unwrap_or_default(),
        ]);
        let reply = self.exchange(request, MessageId::UnitData).await?;

        if !reply.is_ok() {
            return Err(PoiError::unknown(format!(
                "unit data status {}",
                reply.status().unwrap_or_default()
            )));
        }

        let field = |index: usize, name: &str| {
            reply
                .field(index)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PoiError::unknown(format!("unit data without {name}")))
        };
        let device_info = DeviceInfo {
            model: field(1, "model")?,
            serial_number: field(2, "serial number")?,
            firmware: field(3, "firmware")?.parse::<VersionNumber>()?,
        };

        info!(
            model = %device_info.model,
            serial_number = %device_info.serial_number,
            firmware = %device_info.firmware,
            "terminal initialized"
        );
        *lock(&self.shared.device_info) = Some(device_info.clone());
        self.shared.initialized.store(true, Ordering::Release);
        self.shared
            .emit(SessionEvent::Initialized(device_info.clone()));
        Ok(device_info)
    }

    async fn reinitialize(&mut self) -> Result<DeviceInfo> {
        let Some(info) = self.connection_info.clone() else {
            return Err(PoiError::not_connected());
        };
        if !self.transport.is_connected() {
            return Err(PoiError::not_connected());
        }
        if self.shared.initialized.load(Ordering::Acquire) {
            if let Some(device_info) = lock(&self.shared.device_info).clone() {
                return Ok(device_info);
            }
        }

        let device_info = self.initialize(&info).await?;
        *lock(&self.shared.setup_result) =
            Some(DeviceSetupResult::success(info, device_info.clone()));
        Ok(device_info)
    }

    fn arm_keepalives(&mut self) {
        if let Some(interval) = self.shared.config.heartbeat_interval() {
            self.timers.arm(TimerKind::Heartbeat, interval);
        }
        if let Some(interval) = self.shared.config.ping_interval() {
            self.timers.arm(TimerKind::Ping, interval);
        }
    }

    /// Drop the link and fail everything waiting on it.
    ///
    /// `lost` marks an unplanned loss: a connectivity event is published and
    /// no goodbye is sent.
    async fn teardown(&mut self, reason: PoiError, lost: bool) {
        if lost {
            warn!(%reason, "terminal connectivity lost");
            self.shared
                .emit(SessionEvent::ConnectivityLost(reason.clone()));
        } else {
            info!("disconnecting from terminal");
        }

        self.timers.stop_all();
        self.user_input_deadlines.clear();
        self.inputs.fail_all(&reason);
        if let Some(responder) = self.emv_start.take() {
            responder.fail(reason.clone());
        }
        if let Some(flow) = self.emv.as_mut() {
            flow.abort(reason.clone());
        }
        self.publish_emv_state();
        self.backlog.clear();

        if !lost && self.transport.is_connected() {
            if let Err(error) = self
                .transport
                .send(DeviceMessage::new(MessageId::Offline))
                .await
            {
                debug!(%error, "offline notice not delivered");
            }
        }
        if let Err(error) = self.transport.disconnect().await {
            warn!(%error, "transport disconnect failed");
        }

        self.connection_info = None;
        self.shared.connected.store(false, Ordering::Release);
        self.shared.initialized.store(false, Ordering::Release);
        *lock(&self.shared.device_info) = None;
        *lock(&self.shared.setup_result) = None;
        self.shared.emit(SessionEvent::Disconnected);
    }

    async fn stop(&mut self) {
        if self.transport.is_connected() {
            self.teardown(PoiError::unknown("session closed"), false)
                .await;
        }
    }

    // Timers

    async fn on_timers(&mut self) {
        let now = Instant::now();
        while let Some(kind) = self.timers.pop_expired(now) {
            debug!(timer = %kind, "timer fired");
            match kind {
                TimerKind::UserInput => self.on_user_input_timeout().await,
                TimerKind::Heartbeat | TimerKind::Ping => self.on_keepalive(kind).await,
                // Only armed inside an exchange.
                TimerKind::NonUserInput => {}
            }
        }
    }

    async fn on_keepalive(&mut self, kind: TimerKind) {
        let (id, interval, outstanding) = match kind {
            TimerKind::Heartbeat => (
                MessageId::HealthStat,
                self.shared.config.heartbeat_interval(),
                self.heartbeat_outstanding,
            ),
            _ => (
                MessageId::Ping,
                self.shared.config.ping_interval(),
                self.ping_outstanding,
            ),
        };

        if outstanding {
            self.teardown(PoiError::connectivity(format!("{kind} not answered")), true)
                .await;
            return;
        }

        if let Err(error) = self.transport.send(DeviceMessage::new(id)).await {
            self.teardown(PoiError::connectivity(format!("{kind} failed: {error}")), true)
                .await;
            return;
        }

        match kind {
            TimerKind::Heartbeat => self.heartbeat_outstanding = true,
            _ => self.ping_outstanding = true,
        }
        if let Some(interval) = interval {
            self.timers.arm(kind, interval);
        }
    }

    async fn on_user_input_timeout(&mut self) {
        for owner in self.take_expired_user_inputs(Instant::now()) {
            match owner {
                UserInputOwner::Input(kind) => {
                    let Some(input) = self.inputs.take(kind) else {
                        continue;
                    };
                    info!(input = %kind, "input timed out");
                    if let Err(error) = self.reset_device().await {
                        warn!(%error, "reset after input timeout failed");
                    }
                    input.fail(PoiError::timeout());
                    self.shared.emit(SessionEvent::InputTimedOut(kind));
                }
                UserInputOwner::Emv => {
                    info!("card not presented in time");
                    if let Err(error) = self.reset_device().await {
                        warn!(%error, "reset after card timeout failed");
                    }
                    self.abort_emv(PoiError::timeout());
                }
            }
            if !self.transport.is_connected() {
                break;
            }
        }
    }

    // Inbound

    async fn on_inbound(&mut self, message: DeviceMessage) {
        debug!(%message, "received");
        match message.id {
            MessageId::HealthStat => self.heartbeat_outstanding = false,
            MessageId::Ping => self.ping_outstanding = false,
            id if id.is_emv() => self.on_emv_message(message).await,
            id => match InputKind::from_message_id(id) {
                Some(kind) => self.on_input_reply(kind, message),
                None => debug!(%message, "unsolicited message ignored"),
            },
        }
    }

    fn on_input_reply(&mut self, kind: InputKind, message: DeviceMessage) {
        if let Some(input) = self.inputs.take(kind) {
            self.release_user_input(UserInputOwner::Input(kind));
            input.complete(&message);
            return;
        }

        // Card read replies also arrive while an EMV transaction waits for
        // the card.
        if kind == InputKind::Card
            && self.user_input_deadlines.contains_key(&UserInputOwner::Emv)
        {
            if let Some(status) = message.status().filter(|_| !message.is_ok()) {
                let error = input::status_error(kind, status);
                self.abort_emv(error);
            }
            return;
        }

        debug!(input = %kind, "reply for inactive input ignored");
    }

    async fn on_emv_message(&mut self, message: DeviceMessage) {
        let Some(flow) = self.emv.as_mut() else {
            debug!(%message, "EMV message without a transaction");
            return;
        };

        let applied = flow.on_message(&message);
        let (transaction_id, amount) = (flow.transaction_id(), flow.amount());
        match applied {
            Ok(tags) => match message.id {
                MessageId::EmvPreparation => self.set_payment_type().await,
                MessageId::EmvAuthorizationRequest => {
                    self.release_user_input(UserInputOwner::Emv);
                    if let Some(responder) = self.emv_start.take() {
                        responder.resolve(Ok(AuthorizationRequest {
                            transaction_id,
                            tags,
                            amount: amount.unwrap_or(Amount::ZERO),
                        }));
                    }
                }
                MessageId::EmvAuthorizationConfirmation => {
                    // Late confirmation after the submit timed out.
                    if let Some(flow) = self.emv.as_mut() {
                        if let Err(error) = flow.complete() {
                            debug!(%error, "late confirmation not applied");
                        }
                    }
                }
                _ => {}
            },
            Err(error) => {
                if flow.state() == EmvState::Aborted {
                    self.release_user_input(UserInputOwner::Emv);
                    if let Some(responder) = self.emv_start.take() {
                        responder.fail(error);
                    }
                } else {
                    debug!(%error, "EMV message ignored");
                }
            }
        }
        self.publish_emv_state();
    }

    async fn set_payment_type(&mut self) {
        let Some(code) = self.emv_payment_code else {
            return;
        };
        let message = DeviceMessage::new(MessageId::SetPaymentType).with_field(code);
        if let Err(error) = self.send(message).await {
            self.abort_emv(error);
            return;
        }
        if let Some(flow) = self.emv.as_mut() {
            if let Err(error) = flow.mark_payment_type_set() {
                warn!(%error, "payment type set twice");
            }
        }
    }

    /// Abort the active flow and fail the caller waiting on it.
    fn abort_emv(&mut self, reason: PoiError) {
        self.release_user_input(UserInputOwner::Emv);
        if let Some(flow) = self.emv.as_mut() {
            flow.abort(reason.clone());
        }
        if let Some(responder) = self.emv_start.take() {
            responder.fail(reason);
        }
        self.publish_emv_state();
    }

    // Input

    async fn enable_input(&mut self, message: DeviceMessage, input: ActiveInput) {
        let kind = input.kind();
        if let Some(previous) = self.inputs.take(kind) {
            debug!(input = %kind, "replacing active input");
            self.release_user_input(UserInputOwner::Input(kind));
            previous.fail(PoiError::cancelled_by_user());
        }

        if let Err(error) = self.send(message).await {
            input.fail(error);
            return;
        }
        self.inputs.insert(input);
        self.arm_user_input(UserInputOwner::Input(kind));
    }

    async fn cancel_input(&mut self, kind: InputKind) -> Result<()> {
        let Some(input) = self.inputs.take(kind) else {
            debug!(input = %kind, "no active input to cancel");
            return Ok(());
        };
        self.release_user_input(UserInputOwner::Input(kind));

        let reset = self.reset_device().await;
        input.fail(PoiError::cancelled_by_user());
        reset.map_err(cancel_failed)
    }

    // EMV

    async fn start_emv(
        &mut self,
        request: EmvTransactionRequest,
        responder: Responder<AuthorizationRequest>,
    ) {
        if self.emv.as_ref().is_some_and(|f| !f.state().is_terminal()) {
            responder.fail(PoiError::with_description(
                ErrorCode::EmvUnknown,
                "transaction already in progress",
            ));
            return;
        }

        let mut flow = EmvFlow::new(self.shared.config.quick_chip);
        if let Err(error) = flow.capture_amount(request.amount) {
            responder.fail(error);
            return;
        }
        info!(
            transaction_id = %flow.transaction_id(),
            amount = %request.amount,
            "starting EMV transaction"
        );
        self.emv = Some(flow);
        self.emv_payment_code = Some(request.payment_type.code());
        self.publish_emv_state();

        let set_amount = DeviceMessage::new(MessageId::SetAmount)
            .with_field(request.amount.cents().to_string());
        let card_read = InputRequest::Card(
            CardInputRequest::new(EMV_CARD_PROMPT)
                .with_entry_modes([EntryMode::Inserted, EntryMode::Tapped]),
        )
        .to_message();

        for message in [set_amount, card_read] {
            if let Err(error) = self.send(message).await {
                if let Some(flow) = self.emv.as_mut() {
                    flow.abort(error.clone());
                }
                self.publish_emv_state();
                responder.fail(error);
                return;
            }
        }

        self.emv_start = Some(responder);
        self.arm_user_input(UserInputOwner::Emv);
    }

    async fn submit_authorization(
        &mut self,
        response: AuthorizationResponse,
    ) -> Result<AuthorizationOutcome> {
        let Some(flow) = self.emv.as_ref() else {
            return Err(PoiError::with_description(
                ErrorCode::EmvUnknown,
                "no EMV transaction",
            ));
        };
        if flow.state() != EmvState::AuthorizationRequested {
            return Err(PoiError::with_description(
                ErrorCode::EmvUnknown,
                format!("authorization not requested (state {})", flow.state()),
            ));
        }
        let transaction_id = flow.transaction_id();
        let quick_chip = flow.is_quick_chip();
        let message = response.to_message()?;

        let confirmation_tags = if quick_chip {
            self.send(message).await?;
            TagCollection::new()
        } else {
            let reply = self
                .exchange(message, MessageId::EmvAuthorizationConfirmation)
                .await?;
            let flow = self
                .emv
                .as_mut()
                .ok_or_else(|| PoiError::with_description(ErrorCode::EmvUnknown, "no EMV transaction"))?;
            let applied = flow.on_message(&reply);
            self.publish_emv_state();
            applied?
        };

        let completed = match self.emv.as_mut() {
            Some(flow) => flow.complete(),
            None => Err(PoiError::new(ErrorCode::EmvUnknown)),
        };
        self.publish_emv_state();
        completed?;

        info!(%transaction_id, approved = response.approved, quick_chip, "EMV transaction complete");
        Ok(AuthorizationOutcome {
            transaction_id,
            approved: response.approved,
            confirmation_tags,
            quick_chip,
        })
    }

    async fn cancel_transaction(&mut self) -> Result<()> {
        if !self.emv.as_ref().is_some_and(|f| !f.state().is_terminal()) {
            return Ok(());
        }
        self.release_user_input(UserInputOwner::Emv);

        let reset = self.reset_device().await;
        self.abort_emv(PoiError::cancelled_by_user());
        reset.map_err(cancel_failed)
    }

    // Printing

    async fn print(&mut self, job: PrintJob) -> Result<()> {
        debug!(lines = job.lines().len(), "printing");
        let reply = self.exchange(job.to_message(), MessageId::Print).await?;
        match reply.status().and_then(print_status_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn print_barcode(&mut self, request: BarcodeRequest) -> Result<()> {
        let reply = self
            .exchange(request.to_message(), MessageId::PrintBarcode)
            .await?;
        match reply.status().and_then(print_status_error) {
            Some(error) if error.code() == ErrorCode::PrintRequest => Err(PoiError::with_description(
                ErrorCode::BarcodeUnknown,
                error.description(),
            )),
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
