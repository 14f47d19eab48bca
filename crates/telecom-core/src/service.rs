//! The service task
//!
//! [`TelecomService`] owns the [`CallRegistry`] (and through it the audio
//! route engine) on a single tokio task. Everything that wants to change
//! call state queues a [`ServiceCommand`] on its inbox: provider callbacks,
//! hardware events, UI commands, filter verdicts and timer firings. The
//! task handles one command at a time and then executes the effects the
//! registry produced.
//!
//! Outbound work never blocks the task. Subscriber events, provider
//! commands and tone commands are handed to one dispatcher task each, which
//! delivers them in the order they were produced. Replies from providers
//! come back later as new commands.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use rvoip_telecom_core::prelude::*;
//!
//! struct Gateway;
//!
//! #[async_trait]
//! impl ProviderGateway for Gateway {
//!     async fn send(&self, provider: &ProviderId, command: ProviderCommand) -> TelecomResult<()> {
//!         println!("{} <- {}", provider, command.name());
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let sim = AccountHandle::new("telephony", "sim1");
//! let telecom = TelecomServiceBuilder::new()
//!     .gateway(Arc::new(Gateway))
//!     .account(PhoneAccount::new(sim.clone()))
//!     .spawn()?;
//!
//! let call = telecom
//!     .start_outgoing_call(Address::tel("5550100"), Some(sim), VideoState::AUDIO_ONLY)
//!     .await?;
//! telecom.place_outgoing_call(&call, false, VideoState::AUDIO_ONLY).await?;
//! assert_eq!(telecom.foreground_call().await?, Some(call));
//! telecom.shutdown().await?;
//! # Ok::<(), TelecomError>(())
//! # }).unwrap();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::accounts::PhoneAccount;
use crate::audio::{AudioHardware, AudioRoute, AudioStateSnapshot, HardwareEvent, SimulatedAudioHardware};
use crate::call::{CallSnapshot, VideoState};
use crate::config::TelecomConfig;
use crate::error::{TelecomError, TelecomResult};
use crate::events::{EventEmitter, EventSubscription, TelecomEvent};
use crate::logging;
use crate::provider::{
    CallFilter, Extras, FilterVerdict, ProviderCommand, ProviderEvent, ProviderGateway, ToneCommand,
    TonePlayer,
};
use crate::registry::{CallRegistry, Effect, MediaButton};
use crate::timer::{TimerKey, TimerManager};
use crate::types::{AccountHandle, Address, CallId, ProviderId};

/// User-initiated request
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    StartOutgoingCall {
        address: Address,
        account: Option<AccountHandle>,
        video_state: VideoState,
    },
    PlaceOutgoingCall {
        call_id: CallId,
        speakerphone: bool,
        video_state: VideoState,
    },
    CancelOutgoingCall { call_id: CallId },
    PhoneAccountSelected {
        call_id: CallId,
        account: AccountHandle,
        set_default: bool,
    },
    Answer { call_id: CallId, video_state: VideoState },
    Reject {
        call_id: CallId,
        with_message: bool,
        text: Option<String>,
    },
    Hold { call_id: CallId },
    Unhold { call_id: CallId },
    Disconnect { call_id: CallId },
    DisconnectAll,
    Conference { call_id: CallId, other: CallId },
    SplitFromConference { call_id: CallId },
    MergeConference { call_id: CallId },
    SwapConference { call_id: CallId },
    PlayDtmfTone { call_id: CallId, digit: char },
    StopDtmfTone { call_id: CallId },
    PostDialContinue { call_id: CallId, proceed: bool },
    PullExternalCall { call_id: CallId },
    PutExtras { call_id: CallId, extras: Extras },
    RemoveExtras { call_id: CallId, keys: Vec<String> },
    Mute { muted: bool },
    ToggleMute,
    SetAudioRoute { route: AudioRoute },
    MediaButton(MediaButton),
}

/// What a [`UiCommand`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiOutcome {
    Done,
    /// Id of the call a start request created or reused
    Call(CallId),
    /// Whether a media button press was consumed
    Handled(bool),
}

type Reply<T> = oneshot::Sender<TelecomResult<T>>;
type Inspector = Box<dyn FnOnce(&CallRegistry) + Send>;

/// Work item on the service inbox
pub enum ServiceCommand {
    Provider(ProviderEvent),
    Hardware(HardwareEvent),
    TimerFired { key: TimerKey, generation: u64 },
    FilterVerdict { call_id: CallId, verdict: FilterVerdict },
    /// A provider announced an incoming call, or one the core did not know
    NewCall {
        account: AccountHandle,
        address: Option<Address>,
        unknown: bool,
        reply: Reply<CallId>,
    },
    RegisterAccount(PhoneAccount),
    UnregisterAccount {
        handle: AccountHandle,
        reply: Reply<PhoneAccount>,
    },
    SetDefaultAccount {
        scheme: String,
        handle: AccountHandle,
        reply: Reply<()>,
    },
    Ui {
        command: UiCommand,
        reply: Reply<UiOutcome>,
    },
    /// Run a read-only closure against the registry
    Inspect(Inspector),
    Shutdown,
}

impl std::fmt::Debug for ServiceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceCommand::Provider(event) => f.debug_tuple("Provider").field(event).finish(),
            ServiceCommand::Hardware(event) => f.debug_tuple("Hardware").field(event).finish(),
            ServiceCommand::TimerFired { key, generation } => f
                .debug_struct("TimerFired")
                .field("key", key)
                .field("generation", generation)
                .finish(),
            ServiceCommand::FilterVerdict { call_id, verdict } => f
                .debug_struct("FilterVerdict")
                .field("call_id", call_id)
                .field("verdict", verdict)
                .finish(),
            ServiceCommand::NewCall {
                account,
                address,
                unknown,
                ..
            } => f
                .debug_struct("NewCall")
                .field("account", account)
                .field("address", address)
                .field("unknown", unknown)
                .finish(),
            ServiceCommand::RegisterAccount(account) => {
                f.debug_tuple("RegisterAccount").field(&account.handle).finish()
            }
            ServiceCommand::UnregisterAccount { handle, .. } => {
                f.debug_tuple("UnregisterAccount").field(handle).finish()
            }
            ServiceCommand::SetDefaultAccount { scheme, handle, .. } => f
                .debug_struct("SetDefaultAccount")
                .field("scheme", scheme)
                .field("handle", handle)
                .finish(),
            ServiceCommand::Ui { command, .. } => f.debug_tuple("Ui").field(command).finish(),
            ServiceCommand::Inspect(_) => f.write_str("Inspect"),
            ServiceCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Ordered delivery of outbound work
struct Dispatchers {
    events: mpsc::UnboundedSender<TelecomEvent>,
    provider: mpsc::UnboundedSender<(ProviderId, ProviderCommand)>,
    tones: Option<mpsc::UnboundedSender<(CallId, ToneCommand)>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Dispatchers {
    fn start(
        emitter: Arc<EventEmitter>,
        gateway: Arc<dyn ProviderGateway>,
        tone_player: Option<Arc<dyn TonePlayer>>,
    ) -> Self {
        let mut tasks = Vec::new();

        let (events, mut event_rx) = mpsc::unbounded_channel::<TelecomEvent>();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                emitter.emit(event).await;
            }
        }));

        let (provider, mut provider_rx) = mpsc::unbounded_channel::<(ProviderId, ProviderCommand)>();
        tasks.push(tokio::spawn(async move {
            while let Some((id, command)) = provider_rx.recv().await {
                let name = command.name();
                let call_id = command.call_id().clone();
                if let Err(e) = gateway.send(&id, command).await {
                    warn!("Provider {} failed {} for call {}: {}", id, name, call_id, e);
                }
            }
        }));

        let tones = tone_player.map(|player| {
            let (tx, mut rx) = mpsc::unbounded_channel::<(CallId, ToneCommand)>();
            tasks.push(tokio::spawn(async move {
                while let Some((call_id, command)) = rx.recv().await {
                    player.apply(&call_id, command).await;
                }
            }));
            tx
        });

        Self {
            events,
            provider,
            tones,
            tasks,
        }
    }

    fn notify(&self, event: TelecomEvent) {
        if self.events.send(event).is_err() {
            error!("Event dispatcher stopped, dropping event");
        }
    }

    fn provider(&self, provider: ProviderId, command: ProviderCommand) {
        if self.provider.send((provider, command)).is_err() {
            error!("Provider dispatcher stopped, dropping command");
        }
    }

    fn tone(&self, call_id: CallId, command: ToneCommand) {
        match &self.tones {
            Some(tones) => {
                if tones.send((call_id, command)).is_err() {
                    error!("Tone dispatcher stopped, dropping {:?}", command);
                }
            }
            None => trace!("No tone player, ignoring {:?} for call {}", command, call_id),
        }
    }
}

impl Drop for Dispatchers {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Builds and spawns a [`TelecomService`]
pub struct TelecomServiceBuilder {
    config: TelecomConfig,
    gateway: Option<Arc<dyn ProviderGateway>>,
    tone_player: Option<Arc<dyn TonePlayer>>,
    filter: Option<Arc<dyn CallFilter>>,
    hardware: Option<Arc<dyn AudioHardware>>,
    accounts: Vec<PhoneAccount>,
}

impl TelecomServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: TelecomConfig::default(),
            gateway: None,
            tone_player: None,
            filter: None,
            hardware: None,
            accounts: Vec::new(),
        }
    }

    pub fn config(mut self, config: TelecomConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport for provider commands (required)
    pub fn gateway(mut self, gateway: Arc<dyn ProviderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn tone_player(mut self, player: Arc<dyn TonePlayer>) -> Self {
        self.tone_player = Some(player);
        self
    }

    /// Screen incoming calls; without one every call is allowed
    pub fn call_filter(mut self, filter: Arc<dyn CallFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Platform audio controls; defaults to [`SimulatedAudioHardware`]
    pub fn hardware(mut self, hardware: Arc<dyn AudioHardware>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    /// Account registered before the first command is handled
    pub fn account(mut self, account: PhoneAccount) -> Self {
        self.accounts.push(account);
        self
    }

    /// Start the service task on the current tokio runtime
    ///
    /// With `logging.install` set, a global subscriber is installed first
    /// unless the host already has one.
    pub fn spawn(self) -> TelecomResult<TelecomHandle> {
        self.config.validate()?;
        if self.config.logging.install {
            if let Err(e) = logging::init(&self.config.logging) {
                debug!("Keeping the existing subscriber: {}", e);
            }
        }
        let gateway = self
            .gateway
            .ok_or_else(|| TelecomError::config("a provider gateway is required"))?;
        let hardware = self
            .hardware
            .unwrap_or_else(|| Arc::new(SimulatedAudioHardware::new()));

        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        let emitter = Arc::new(EventEmitter::new());
        let mut registry = CallRegistry::new(self.config, hardware);
        for account in self.accounts {
            registry.register_account(account);
        }

        let service = TelecomService {
            registry,
            timers: TimerManager::new(tx.clone()),
            inbox: rx,
            tx: tx.clone(),
            filter: self.filter,
            dispatch: Dispatchers::start(emitter.clone(), gateway, self.tone_player),
        };
        let task = tokio::spawn(service.run());

        Ok(TelecomHandle {
            tx,
            emitter,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }
}

impl Default for TelecomServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the registry on the service task
pub struct TelecomService {
    registry: CallRegistry,
    timers: TimerManager,
    inbox: mpsc::Receiver<ServiceCommand>,
    /// Own inbox, for filter verdicts computed off the task
    tx: mpsc::Sender<ServiceCommand>,
    filter: Option<Arc<dyn CallFilter>>,
    dispatch: Dispatchers,
}

impl TelecomService {
    async fn run(mut self) {
        info!("Telecom service v{} started", crate::VERSION);
        while let Some(command) = self.inbox.recv().await {
            if matches!(command, ServiceCommand::Shutdown) {
                break;
            }
            trace!("Handling {:?}", command);
            self.handle(command);
            self.execute_effects();
        }
        self.timers.cancel_all();
        info!("Telecom service stopped with {} calls", self.registry.calls().len());
    }

    fn handle(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Provider(event) => {
                if let Err(e) = self.registry.on_provider_event(event) {
                    debug!("Provider event rejected: {}", e);
                }
            }
            ServiceCommand::Hardware(event) => self.registry.on_hardware_event(event),
            ServiceCommand::TimerFired { key, generation } => {
                if self.timers.take_fired(&key, generation) {
                    self.registry.on_timer_fired(key);
                }
            }
            ServiceCommand::FilterVerdict { call_id, verdict } => {
                if let Err(e) = self.registry.on_filter_verdict(&call_id, verdict) {
                    debug!("Filter verdict for {} dropped: {}", call_id, e);
                }
            }
            ServiceCommand::NewCall {
                account,
                address,
                unknown,
                reply,
            } => {
                let result = if unknown {
                    self.registry.add_new_unknown_call(account, address)
                } else {
                    self.registry.process_incoming_call(account, address)
                };
                let _ = reply.send(result);
            }
            ServiceCommand::RegisterAccount(account) => {
                info!("Registering account {}", account.handle);
                self.registry.register_account(account);
            }
            ServiceCommand::UnregisterAccount { handle, reply } => {
                let _ = reply.send(self.registry.unregister_account(&handle));
            }
            ServiceCommand::SetDefaultAccount { scheme, handle, reply } => {
                let _ = reply.send(self.registry.set_default_account(&scheme, handle));
            }
            ServiceCommand::Ui { command, reply } => {
                let result = self.apply_ui(command);
                if let Err(e) = &result {
                    debug!("UI command failed: {}", e);
                }
                let _ = reply.send(result);
            }
            ServiceCommand::Inspect(inspect) => inspect(&self.registry),
            ServiceCommand::Shutdown => {}
        }
    }

    fn apply_ui(&mut self, command: UiCommand) -> TelecomResult<UiOutcome> {
        let registry = &mut self.registry;
        match command {
            UiCommand::StartOutgoingCall {
                address,
                account,
                video_state,
            } => return registry.start_outgoing_call(address, account, video_state).map(UiOutcome::Call),
            UiCommand::PlaceOutgoingCall {
                call_id,
                speakerphone,
                video_state,
            } => registry.place_outgoing_call(&call_id, speakerphone, video_state)?,
            UiCommand::CancelOutgoingCall { call_id } => registry.cancel_outgoing_call(&call_id)?,
            UiCommand::PhoneAccountSelected {
                call_id,
                account,
                set_default,
            } => registry.phone_account_selected(&call_id, account, set_default)?,
            UiCommand::Answer { call_id, video_state } => registry.answer_call(&call_id, video_state)?,
            UiCommand::Reject {
                call_id,
                with_message,
                text,
            } => registry.reject_call(&call_id, with_message, text)?,
            UiCommand::Hold { call_id } => registry.hold_call(&call_id)?,
            UiCommand::Unhold { call_id } => registry.unhold_call(&call_id)?,
            UiCommand::Disconnect { call_id } => registry.disconnect_call(&call_id)?,
            UiCommand::DisconnectAll => registry.disconnect_all_calls(),
            UiCommand::Conference { call_id, other } => registry.conference(&call_id, &other)?,
            UiCommand::SplitFromConference { call_id } => registry.split_from_conference(&call_id)?,
            UiCommand::MergeConference { call_id } => registry.merge_conference(&call_id)?,
            UiCommand::SwapConference { call_id } => registry.swap_conference(&call_id)?,
            UiCommand::PlayDtmfTone { call_id, digit } => registry.play_dtmf_tone(&call_id, digit)?,
            UiCommand::StopDtmfTone { call_id } => registry.stop_dtmf_tone(&call_id)?,
            UiCommand::PostDialContinue { call_id, proceed } => {
                registry.post_dial_continue(&call_id, proceed)?
            }
            UiCommand::PullExternalCall { call_id } => registry.pull_external_call(&call_id)?,
            UiCommand::PutExtras { call_id, extras } => registry.put_extras(&call_id, extras)?,
            UiCommand::RemoveExtras { call_id, keys } => registry.remove_extras(&call_id, keys)?,
            UiCommand::Mute { muted } => registry.mute(muted),
            UiCommand::ToggleMute => registry.toggle_mute(),
            UiCommand::SetAudioRoute { route } => registry.set_audio_route(route),
            UiCommand::MediaButton(button) => {
                return Ok(UiOutcome::Handled(registry.on_media_button(button)));
            }
        }
        Ok(UiOutcome::Done)
    }

    /// Drain the registry until it stops producing effects
    fn execute_effects(&mut self) {
        loop {
            let effects = self.registry.take_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                match effect {
                    Effect::Notify(event) => self.dispatch.notify(event),
                    Effect::Provider { provider, command } => self.dispatch.provider(provider, command),
                    Effect::Tone { call_id, command } => self.dispatch.tone(call_id, command),
                    Effect::Timer(request) => self.timers.apply(request),
                    Effect::FilterRequested(call) => self.run_filter(call),
                }
            }
        }
    }

    fn run_filter(&mut self, call: CallSnapshot) {
        let Some(filter) = self.filter.clone() else {
            if let Err(e) = self.registry.on_filter_verdict(&call.call_id, FilterVerdict::allow()) {
                warn!("Could not admit call {}: {}", call.call_id, e);
            }
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let verdict = filter.filter(&call).await;
            debug!("Filter returned {:?} for call {}", verdict, call.call_id);
            let command = ServiceCommand::FilterVerdict {
                call_id: call.call_id,
                verdict,
            };
            if tx.send(command).await.is_err() {
                trace!("Service stopped before the filter finished");
            }
        });
    }
}

/// Cloneable front end to a running [`TelecomService`]
#[derive(Clone)]
pub struct TelecomHandle {
    tx: mpsc::Sender<ServiceCommand>,
    emitter: Arc<EventEmitter>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for TelecomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelecomHandle")
            .field("running", &self.is_running())
            .field("subscriptions", &self.emitter.subscription_count())
            .finish()
    }
}

impl TelecomHandle {
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        self.emitter.subscribe(subscription)
    }

    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        self.emitter.unsubscribe(subscription_id)
    }

    async fn send(&self, command: ServiceCommand) -> TelecomResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TelecomError::unavailable("telecom service has stopped"))
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> ServiceCommand) -> TelecomResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await
            .map_err(|_| TelecomError::unavailable("telecom service dropped the request"))?
    }

    async fn ui(&self, command: UiCommand) -> TelecomResult<UiOutcome> {
        self.request(|reply| ServiceCommand::Ui { command, reply }).await
    }

    async fn ui_done(&self, command: UiCommand) -> TelecomResult<()> {
        self.ui(command).await.map(|_| ())
    }

    /// Run `f` against the registry on the service task
    pub async fn inspect<T, F>(&self, f: F) -> TelecomResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CallRegistry) -> T + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let inspect: Inspector = Box::new(move |registry: &CallRegistry| {
            let _ = reply.send(f(registry));
        });
        self.send(ServiceCommand::Inspect(inspect)).await?;
        rx.await
            .map_err(|_| TelecomError::unavailable("telecom service dropped the request"))
    }

    // Provider and platform inputs

    pub async fn provider_event(&self, event: ProviderEvent) -> TelecomResult<()> {
        self.send(ServiceCommand::Provider(event)).await
    }

    pub async fn hardware_event(&self, event: HardwareEvent) -> TelecomResult<()> {
        self.send(ServiceCommand::Hardware(event)).await
    }

    /// Report the incoming-call filter's decision for `call_id`
    pub async fn filter_verdict(&self, call_id: CallId, verdict: FilterVerdict) -> TelecomResult<()> {
        self.send(ServiceCommand::FilterVerdict { call_id, verdict }).await
    }

    pub async fn process_incoming_call(
        &self,
        account: AccountHandle,
        address: Option<Address>,
    ) -> TelecomResult<CallId> {
        self.request(|reply| ServiceCommand::NewCall {
            account,
            address,
            unknown: false,
            reply,
        })
        .await
    }

    pub async fn add_new_unknown_call(
        &self,
        account: AccountHandle,
        address: Option<Address>,
    ) -> TelecomResult<CallId> {
        self.request(|reply| ServiceCommand::NewCall {
            account,
            address,
            unknown: true,
            reply,
        })
        .await
    }

    pub async fn register_account(&self, account: PhoneAccount) -> TelecomResult<()> {
        self.send(ServiceCommand::RegisterAccount(account)).await
    }

    pub async fn unregister_account(&self, handle: AccountHandle) -> TelecomResult<PhoneAccount> {
        self.request(|reply| ServiceCommand::UnregisterAccount { handle, reply })
            .await
    }

    pub async fn set_default_account(&self, scheme: &str, handle: AccountHandle) -> TelecomResult<()> {
        let scheme = scheme.to_string();
        self.request(|reply| ServiceCommand::SetDefaultAccount { scheme, handle, reply })
            .await
    }

    // UI commands

    pub async fn start_outgoing_call(
        &self,
        address: Address,
        account: Option<AccountHandle>,
        video_state: VideoState,
    ) -> TelecomResult<CallId> {
        match self
            .ui(UiCommand::StartOutgoingCall {
                address,
                account,
                video_state,
            })
            .await?
        {
            UiOutcome::Call(call_id) => Ok(call_id),
            other => Err(TelecomError::internal(format!(
                "start_outgoing_call answered with {:?}",
                other
            ))),
        }
    }

    pub async fn place_outgoing_call(
        &self,
        call_id: &CallId,
        speakerphone: bool,
        video_state: VideoState,
    ) -> TelecomResult<()> {
        self.ui_done(UiCommand::PlaceOutgoingCall {
            call_id: call_id.clone(),
            speakerphone,
            video_state,
        })
        .await
    }

    pub async fn cancel_outgoing_call(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::CancelOutgoingCall {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn phone_account_selected(
        &self,
        call_id: &CallId,
        account: AccountHandle,
        set_default: bool,
    ) -> TelecomResult<()> {
        self.ui_done(UiCommand::PhoneAccountSelected {
            call_id: call_id.clone(),
            account,
            set_default,
        })
        .await
    }

    pub async fn answer_call(&self, call_id: &CallId, video_state: VideoState) -> TelecomResult<()> {
        self.ui_done(UiCommand::Answer {
            call_id: call_id.clone(),
            video_state,
        })
        .await
    }

    pub async fn reject_call(
        &self,
        call_id: &CallId,
        with_message: bool,
        text: Option<String>,
    ) -> TelecomResult<()> {
        self.ui_done(UiCommand::Reject {
            call_id: call_id.clone(),
            with_message,
            text,
        })
        .await
    }

    pub async fn hold_call(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::Hold {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn unhold_call(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::Unhold {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn disconnect_call(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::Disconnect {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn disconnect_all_calls(&self) -> TelecomResult<()> {
        self.ui_done(UiCommand::DisconnectAll).await
    }

    pub async fn conference(&self, call_id: &CallId, other: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::Conference {
            call_id: call_id.clone(),
            other: other.clone(),
        })
        .await
    }

    pub async fn split_from_conference(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::SplitFromConference {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn merge_conference(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::MergeConference {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn swap_conference(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::SwapConference {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn play_dtmf_tone(&self, call_id: &CallId, digit: char) -> TelecomResult<()> {
        self.ui_done(UiCommand::PlayDtmfTone {
            call_id: call_id.clone(),
            digit,
        })
        .await
    }

    pub async fn stop_dtmf_tone(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::StopDtmfTone {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn post_dial_continue(&self, call_id: &CallId, proceed: bool) -> TelecomResult<()> {
        self.ui_done(UiCommand::PostDialContinue {
            call_id: call_id.clone(),
            proceed,
        })
        .await
    }

    pub async fn pull_external_call(&self, call_id: &CallId) -> TelecomResult<()> {
        self.ui_done(UiCommand::PullExternalCall {
            call_id: call_id.clone(),
        })
        .await
    }

    pub async fn put_extras(&self, call_id: &CallId, extras: Extras) -> TelecomResult<()> {
        self.ui_done(UiCommand::PutExtras {
            call_id: call_id.clone(),
            extras,
        })
        .await
    }

    pub async fn remove_extras(&self, call_id: &CallId, keys: Vec<String>) -> TelecomResult<()> {
        self.ui_done(UiCommand::RemoveExtras {
            call_id: call_id.clone(),
            keys,
        })
        .await
    }

    pub async fn mute(&self, muted: bool) -> TelecomResult<()> {
        self.ui_done(UiCommand::Mute { muted }).await
    }

    pub async fn toggle_mute(&self) -> TelecomResult<()> {
        self.ui_done(UiCommand::ToggleMute).await
    }

    pub async fn set_audio_route(&self, route: AudioRoute) -> TelecomResult<()> {
        self.ui_done(UiCommand::SetAudioRoute { route }).await
    }

    /// Returns whether the press did anything
    pub async fn on_media_button(&self, button: MediaButton) -> TelecomResult<bool> {
        match self.ui(UiCommand::MediaButton(button)).await? {
            UiOutcome::Handled(handled) => Ok(handled),
            other => Err(TelecomError::internal(format!(
                "media button answered with {:?}",
                other
            ))),
        }
    }

    // Queries

    pub async fn snapshot(&self, call_id: &CallId) -> TelecomResult<Option<CallSnapshot>> {
        let call_id = call_id.clone();
        self.inspect(move |registry| registry.snapshot(&call_id)).await
    }

    /// Snapshots of every tracked call
    pub async fn calls(&self) -> TelecomResult<Vec<CallSnapshot>> {
        self.inspect(|registry| registry.calls()).await
    }

    pub async fn foreground_call(&self) -> TelecomResult<Option<CallId>> {
        self.inspect(|registry| registry.foreground_call().cloned()).await
    }

    pub async fn can_add_call(&self) -> TelecomResult<bool> {
        self.inspect(|registry| registry.can_add_call()).await
    }

    pub async fn audio_state(&self) -> TelecomResult<AudioStateSnapshot> {
        self.inspect(|registry| registry.audio().last_dispatched()).await
    }

    /// Stop the service task and wait for it to exit
    pub async fn shutdown(&self) -> TelecomResult<()> {
        let task = self.task.lock().take();
        self.send(ServiceCommand::Shutdown).await?;
        if let Some(task) = task {
            task.await
                .map_err(|e| TelecomError::internal(format!("service task failed: {}", e)))?;
        }
        Ok(())
    }
}
