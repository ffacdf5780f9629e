//! Caller-facing session handle.
//!
//! [`DeviceSession`] is a cheap, cloneable handle to one terminal. Every
//! device operation checks the connection and initialization flags
//! synchronously, then queues a command for the session actor and returns a
//! [`Pending`] result. Precondition failures never reach the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use poi_core::{
    CardData, DeviceConnectionInfo, DeviceInfo, DeviceSetupResult, ErrorCode, PinBlock, PoiError,
    ReceiptData, Result,
};
use poi_hardware::Transport;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

use crate::actor::{Command, SessionActor};
use crate::config::SessionConfig;
use crate::emv::{
    AuthorizationOutcome, AuthorizationRequest, AuthorizationResponse, EmvState,
    EmvTransactionRequest,
};
use crate::input::{
    ActiveInput, AlphaInputRequest, CardInputRequest, ChoiceInputRequest, InputKind,
    InputRequest, NumericInputRequest, PinInputRequest, YesNoInputRequest,
};
use crate::pending::{Pending, pending};
use crate::printer::{BarcodeRequest, Column, ReceiptBuilder};

/// Notifications published by the session actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// The transport link is up.
    Connected,
    /// Unit data was read from the terminal.
    Initialized(DeviceInfo),
    Disconnected,
    /// A keep-alive went unanswered or the link failed.
    ConnectivityLost(PoiError),
    /// The customer did not answer an input prompt in time.
    InputTimedOut(InputKind),
    EmvStateChanged(EmvState),
}

fn queue_error<T>(error: mpsc::error::TrySendError<T>) -> PoiError {
    match error {
        mpsc::error::TrySendError::Full(_) => PoiError::unknown("session command queue is full"),
        mpsc::error::TrySendError::Closed(_) => PoiError::unknown("session closed"),
    }
}

/// State readable without a round trip through the actor.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) connected: AtomicBool,
    pub(crate) initialized: AtomicBool,
    pub(crate) connecting: AtomicBool,
    pub(crate) device_info: Mutex<Option<DeviceInfo>>,
    pub(crate) setup_result: Mutex<Option<DeviceSetupResult>>,
    pub(crate) receipt: Mutex<ReceiptBuilder>,
    pub(crate) emv_state: watch::Receiver<EmvState>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn emit(&self, event: SessionEvent) {
        debug!(?event, "session event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Handle to one terminal session.
///
/// # Examples
///
/// ```
/// use poi_core::{DeviceConnectionInfo, TcpIpConfiguration};
/// use poi_hardware::MockTransport;
/// use poi_session::{DeviceSession, SessionConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> poi_core::Result<()> {
/// let (transport, _terminal) = MockTransport::new();
/// let session = DeviceSession::spawn(transport, SessionConfig::default())?;
///
/// let info = DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new("10.0.0.2", 12000));
/// let setup = session.connect(info)?.await?;
/// assert!(setup.did_configure_successfully);
/// assert!(session.is_initialized());
///
/// session.start_new_receipt()?;
/// session.add_text("Thank you")?;
/// session.send_current_job_to_printer()?.await?;
/// session.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceSession {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
}

impl DeviceSession {
    /// Start the session actor for `transport` on the current Tokio
    /// runtime. The session starts disconnected.
    ///
    /// # Errors
    ///
    /// `ConfigurationReadUnknown` when `config` is invalid.
    pub fn spawn<T>(transport: T, config: SessionConfig) -> Result<Self>
    where
        T: Transport + 'static,
    {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (emv_tx, emv_rx) = watch::channel(EmvState::Idle);

        let shared = Arc::new(Shared {
            receipt: Mutex::new(ReceiptBuilder::new(config.printer_width)),
            config,
            connected: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            device_info: Mutex::new(None),
            setup_result: Mutex::new(None),
            emv_state: emv_rx,
            events: event_tx,
        });

        let actor = SessionActor::new(transport, Arc::clone(&shared), command_rx, emv_tx);
        tokio::spawn(actor.run());
        info!("device session started");

        Ok(Self {
            shared,
            commands: command_tx,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        lock(&self.shared.device_info).clone()
    }

    /// Current EMV flow state.
    pub fn emv_state(&self) -> EmvState {
        *self.shared.emv_state.borrow()
    }

    /// Receiver for EMV state changes.
    pub fn watch_emv_state(&self) -> watch::Receiver<EmvState> {
        self.shared.emv_state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(PoiError::not_connected());
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        self.ensure_connected()?;
        if !self.is_initialized() {
            return Err(PoiError::not_initialized());
        }
        Ok(())
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        self.commands.try_send(command).map_err(queue_error)
    }

    /// Claim a queue slot up front, for commands whose inputs must not be
    /// consumed unless they can be queued.
    fn reserve(&self) -> Result<mpsc::Permit<'_, Command>> {
        self.commands.try_reserve().map_err(queue_error)
    }

    // Connection

    /// Connect and initialize the terminal described by `info`.
    ///
    /// Resolves with the setup result, which carries the failure when the
    /// link or initialization failed. Connecting a connected session
    /// resolves immediately with the existing result.
    ///
    /// # Errors
    ///
    /// `ParameterIsNil` for an incomplete `info`; `Unknown` while another
    /// connection attempt is in flight.
    pub fn connect(&self, info: DeviceConnectionInfo) -> Result<Pending<DeviceSetupResult>> {
        info.validate_configuration()?;

        if self.is_connected() {
            let existing = lock(&self.shared.setup_result).clone();
            if let Some(result) = existing {
                return Ok(Pending::ready(Ok(result)));
            }
        }

        if self
            .shared
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoiError::unknown("connection attempt already in progress"));
        }

        let (responder, pending) = pending();
        if let Err(error) = self.enqueue(Command::Connect { info, responder }) {
            self.shared.connecting.store(false, Ordering::Release);
            return Err(error);
        }
        Ok(pending)
    }

    /// Retry initialization on a connected terminal.
    pub fn initialize(&self) -> Result<Pending<DeviceInfo>> {
        self.ensure_connected()?;
        if self.is_initialized() {
            if let Some(info) = self.device_info() {
                return Ok(Pending::ready(Ok(info)));
            }
        }
        let (responder, pending) = pending();
        self.enqueue(Command::Initialize(responder))?;
        Ok(pending)
    }

    /// Disconnect. Pending operations fail with `NotConnected`.
    pub fn disconnect(&self) -> Result<Pending<()>> {
        if !self.is_connected() {
            return Ok(Pending::ready(Ok(())));
        }
        let (responder, pending) = pending();
        self.enqueue(Command::Disconnect(responder))?;
        Ok(pending)
    }

    /// Disconnect and stop the actor. Later operations fail with `Unknown`.
    pub async fn shutdown(&self) {
        let (responder, pending) = pending();
        if self.commands.send(Command::Shutdown(responder)).await.is_ok() {
            let _ = pending.await;
        }
    }

    // Input

    fn enable_input(&self, request: InputRequest, input: ActiveInput) -> Result<()> {
        self.enqueue(Command::EnableInput {
            message: request.to_message(),
            input,
        })
    }

    pub fn enable_card_input(&self, request: CardInputRequest) -> Result<Pending<CardData>> {
        self.ensure_ready()?;
        let validated = InputRequest::card(request.clone())?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::Card(request, responder))?;
        Ok(pending)
    }

    pub fn enable_alpha_input(&self, request: AlphaInputRequest) -> Result<Pending<String>> {
        self.ensure_ready()?;
        let validated = InputRequest::alpha(request)?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::Alpha(responder))?;
        Ok(pending)
    }

    pub fn enable_numeric_input(&self, request: NumericInputRequest) -> Result<Pending<String>> {
        self.ensure_ready()?;
        let validated = InputRequest::numeric(request.clone())?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::Numeric(request, responder))?;
        Ok(pending)
    }

    pub fn enable_pin_input(&self, request: PinInputRequest) -> Result<Pending<PinBlock>> {
        self.ensure_ready()?;
        let validated = InputRequest::pin(request)?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::Pin(responder))?;
        Ok(pending)
    }

    /// Resolves with the index of the selected choice.
    pub fn enable_choice_input(&self, request: ChoiceInputRequest) -> Result<Pending<usize>> {
        self.ensure_ready()?;
        let validated = InputRequest::choice(request.clone())?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::Choice(request, responder))?;
        Ok(pending)
    }

    pub fn enable_yes_no_input(&self, request: YesNoInputRequest) -> Result<Pending<bool>> {
        self.ensure_ready()?;
        let validated = InputRequest::yes_no(request)?;
        let (responder, pending) = pending();
        self.enable_input(validated, ActiveInput::YesNo(responder))?;
        Ok(pending)
    }

    /// Reset the device and fail the active input of `kind` with
    /// `CancelledByUser`. Resolves with `CancelTransactionOnDeviceFailed`
    /// when the reset fails; the input is cancelled either way.
    pub fn cancel_input(&self, kind: InputKind) -> Result<Pending<()>> {
        self.ensure_ready()?;
        let (responder, pending) = pending();
        self.enqueue(Command::CancelInput { kind, responder })?;
        Ok(pending)
    }

    // EMV

    /// Present the amount and wait for the card to request online
    /// authorization.
    pub fn start_emv_transaction(
        &self,
        request: EmvTransactionRequest,
    ) -> Result<Pending<AuthorizationRequest>> {
        self.ensure_ready()?;
        request.validate()?;
        let (responder, pending) = pending();
        self.enqueue(Command::StartEmv { request, responder })?;
        Ok(pending)
    }

    /// Forward the host's answer to the card.
    pub fn submit_authorization_response(
        &self,
        response: AuthorizationResponse,
    ) -> Result<Pending<AuthorizationOutcome>> {
        self.ensure_ready()?;
        let (responder, pending) = pending();
        self.enqueue(Command::SubmitAuthorization {
            response,
            responder,
        })?;
        Ok(pending)
    }

    /// Abort the active EMV transaction and reset the device.
    pub fn cancel_transaction(&self) -> Result<Pending<()>> {
        self.ensure_ready()?;
        let (responder, pending) = pending();
        self.enqueue(Command::CancelTransaction(responder))?;
        Ok(pending)
    }

    // Receipt

    fn with_receipt<R>(&self, f: impl FnOnce(&mut ReceiptBuilder) -> R) -> Result<R> {
        self.ensure_ready()?;
        let mut receipt = lock(&self.shared.receipt);
        Ok(f(&mut receipt))
    }

    pub fn start_new_receipt(&self) -> Result<()> {
        self.with_receipt(ReceiptBuilder::start_new_receipt)
    }

    pub fn add_text(&self, text: &str) -> Result<()> {
        self.with_receipt(|r| r.add_text(text))
    }

    pub fn add_new_line(&self) -> Result<()> {
        self.with_receipt(ReceiptBuilder::add_new_line)
    }

    pub fn add_separator_line(&self) -> Result<()> {
        self.with_receipt(ReceiptBuilder::add_separator_line)
    }

    pub fn add_amount_separator_line(&self) -> Result<()> {
        self.with_receipt(ReceiptBuilder::add_amount_separator_line)
    }

    pub fn add_signature_line(&self) -> Result<()> {
        self.with_receipt(ReceiptBuilder::add_signature_line)
    }

    pub fn add_centered(&self, text: &str) -> Result<()> {
        self.with_receipt(|r| r.add_centered(text))
    }

    pub fn add_justified(&self, left: &str, right: &str) -> Result<()> {
        self.with_receipt(|r| r.add_justified(left, right))
    }

    pub fn add_lines<S: AsRef<str>>(&self, lines: &[S], centered: bool) -> Result<()> {
        self.with_receipt(|r| r.add_lines(lines, centered))
    }

    pub fn add_columns(&self, columns: &[Column]) -> Result<()> {
        self.with_receipt(|r| r.add_columns(columns))?
    }

    pub fn add_three_columns(&self, first: &str, second: &str, third: &str) -> Result<()> {
        self.with_receipt(|r| r.add_three_columns(first, second, third))?
    }

    pub fn forward(&self, lines: Option<usize>) -> Result<()> {
        self.with_receipt(|r| r.forward(lines))
    }

    pub fn add_receipt_data(&self, data: &ReceiptData) -> Result<()> {
        self.with_receipt(|r| r.add_receipt_data(data))
    }

    /// Send everything added since the last flush. Resolves immediately
    /// when nothing is pending.
    ///
    /// The buffer is only emptied once the job is queued, so a flush that
    /// fails synchronously can be retried.
    pub fn send_current_job_to_printer(&self) -> Result<Pending<()>> {
        if self.with_receipt(|r| r.is_empty())? {
            return Ok(Pending::ready(Ok(())));
        }
        let permit = self.reserve()?;
        let Some(job) = self.with_receipt(ReceiptBuilder::take_job)? else {
            return Ok(Pending::ready(Ok(())));
        };
        let (responder, pending) = pending();
        permit.send(Command::Print { job, responder });
        Ok(pending)
    }

    // Immediate printing

    fn print_now(&self, fill: impl FnOnce(&mut ReceiptBuilder)) -> Result<Pending<()>> {
        let mut builder = ReceiptBuilder::new(self.shared.config.printer_width);
        fill(&mut builder);
        let job = builder
            .take_job()
            .ok_or_else(|| PoiError::with_description(ErrorCode::PrintRequest, "nothing to print"))?;
        let (responder, pending) = pending();
        self.enqueue(Command::Print { job, responder })?;
        Ok(pending)
    }

    /// Print `text` right away, bypassing the receipt buffer.
    pub fn print_custom_text(&self, text: &str) -> Result<Pending<()>> {
        self.ensure_ready()?;
        if text.trim().is_empty() {
            return Err(PoiError::parameter_is_nil("text"));
        }
        self.print_now(|builder| builder.add_text(text))
    }

    /// Render and print `data` right away, bypassing the receipt buffer.
    pub fn print_receipt_data(&self, data: &ReceiptData) -> Result<Pending<()>> {
        self.ensure_ready()?;
        self.print_now(|builder| {
            builder.add_receipt_data(data);
            builder.forward(None);
        })
    }

    pub fn print_barcode(&self, request: BarcodeRequest) -> Result<Pending<()>> {
        self.ensure_ready()?;
        request.validate()?;
        let (responder, pending) = pending();
        self.enqueue(Command::PrintBarcode { request, responder })?;
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::BarcodeType;
    use poi_core::{Amount, PaymentType, TcpIpConfiguration};
    use poi_hardware::MockTransport;
    use rstest::rstest;

    fn session() -> DeviceSession {
        let (transport, _terminal) = MockTransport::new();
        DeviceSession::spawn(transport, SessionConfig::default().without_keepalive()).unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let session = session();

        let checks: Vec<Result<()>> = vec![
            session.enable_card_input(CardInputRequest::new("SWIPE")).map(drop),
            session
                .enable_yes_no_input(YesNoInputRequest {
                    prompt: "OK?".into(),
                })
                .map(drop),
            session.cancel_input(InputKind::Card).map(drop),
            session
                .start_emv_transaction(EmvTransactionRequest::new(
                    Amount::from_cents(100),
                    PaymentType::Credit,
                ))
                .map(drop),
            session.cancel_transaction().map(drop),
            session.start_new_receipt(),
            session.add_text("A"),
            session.send_current_job_to_printer().map(drop),
            session.print_custom_text("A").map(drop),
            session
                .print_barcode(BarcodeRequest::new(BarcodeType::Code128, "1"))
                .map(drop),
            session.initialize().map(drop),
        ];

        for check in checks {
            assert_eq!(check.unwrap_err().code(), ErrorCode::NotConnected);
        }
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_succeeds() {
        let session = session();
        session.disconnect().unwrap().await.unwrap();
        assert!(!session.is_connected());
    }

    #[rstest]
    #[case::missing_address(TcpIpConfiguration::new("", 12000))]
    #[case::missing_port(TcpIpConfiguration::new("10.0.0.2", 0))]
    #[tokio::test]
    async fn test_connect_validates_info(#[case] configuration: TcpIpConfiguration) {
        let session = session();
        let error = session
            .connect(DeviceConnectionInfo::tcp_ip(configuration))
            .map(drop)
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::ParameterIsNil);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (transport, _terminal) = MockTransport::new();
        let error = DeviceSession::spawn(transport, SessionConfig::default().with_printer_width(2))
            .map(drop)
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::ConfigurationReadUnknown);
    }

    #[tokio::test]
    async fn test_operations_after_shutdown_fail() {
        let session = session();
        session.shutdown().await;
        session.shutdown().await;

        let error = session
            .connect(DeviceConnectionInfo::tcp_ip(TcpIpConfiguration::new(
                "10.0.0.2", 12000,
            )))
            .map(drop)
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::Unknown);
    }
}
