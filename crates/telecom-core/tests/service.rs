//! The service task end to end: gateway, filter, timers, subscribers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use rvoip_telecom_core::prelude::*;
use rvoip_telecom_core::{CallDisposition, ConnectionInfo, ToneCommand, TonePlayer};

const WAIT: Duration = Duration::from_secs(5);

struct ChannelGateway {
    tx: mpsc::UnboundedSender<(ProviderId, ProviderCommand)>,
}

#[async_trait]
impl ProviderGateway for ChannelGateway {
    async fn send(&self, provider: &ProviderId, command: ProviderCommand) -> TelecomResult<()> {
        let _ = self.tx.send((provider.clone(), command));
        Ok(())
    }
}

struct ChannelTones {
    tx: mpsc::UnboundedSender<ToneCommand>,
}

#[async_trait]
impl TonePlayer for ChannelTones {
    async fn apply(&self, _call_id: &CallId, command: ToneCommand) {
        let _ = self.tx.send(command);
    }
}

struct ChannelEvents {
    tx: mpsc::UnboundedSender<TelecomEvent>,
}

#[async_trait]
impl TelecomEventHandler for ChannelEvents {
    async fn on_event(&self, event: TelecomEvent) {
        let _ = self.tx.send(event);
    }
}

struct BlockAll;

#[async_trait]
impl CallFilter for BlockAll {
    async fn filter(&self, _call: &CallSnapshot) -> FilterVerdict {
        FilterVerdict::block()
    }
}

fn sim() -> AccountHandle {
    AccountHandle::new("telephony", "sim1")
}

fn builder() -> (TelecomServiceBuilder, mpsc::UnboundedReceiver<(ProviderId, ProviderCommand)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let builder = TelecomServiceBuilder::new()
        .gateway(Arc::new(ChannelGateway { tx }))
        .account(PhoneAccount::new(sim()));
    (builder, rx)
}

/// Next command the gateway saw that matches `pred`
async fn next_command(
    rx: &mut mpsc::UnboundedReceiver<(ProviderId, ProviderCommand)>,
    pred: impl Fn(&ProviderCommand) -> bool,
) -> anyhow::Result<(ProviderId, ProviderCommand)> {
    loop {
        let (provider, command) = timeout(WAIT, rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("gateway channel closed"))?;
        if pred(&command) {
            return Ok((provider, command));
        }
    }
}

async fn active_call(
    telecom: &TelecomHandle,
    gateway: &mut mpsc::UnboundedReceiver<(ProviderId, ProviderCommand)>,
) -> anyhow::Result<CallId> {
    let call = telecom
        .start_outgoing_call(Address::tel("5550100"), Some(sim()), VideoState::AUDIO_ONLY)
        .await?;
    telecom
        .place_outgoing_call(&call, false, VideoState::AUDIO_ONLY)
        .await?;
    next_command(gateway, |c| matches!(c, ProviderCommand::CreateConnection { .. })).await?;
    telecom
        .provider_event(ProviderEvent::ConnectionCreated {
            call_id: call.clone(),
            info: ConnectionInfo {
                capabilities: Capabilities::HOLD,
                ..Default::default()
            },
        })
        .await?;
    telecom
        .provider_event(ProviderEvent::SetActive { call_id: call.clone() })
        .await?;
    Ok(call)
}

#[tokio::test]
async fn test_outgoing_call_is_sent_to_provider() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let telecom = builder.spawn()?;

    let call = telecom
        .start_outgoing_call(Address::tel("5550100"), None, VideoState::AUDIO_ONLY)
        .await?;
    telecom
        .place_outgoing_call(&call, false, VideoState::AUDIO_ONLY)
        .await?;

    let (provider, command) =
        next_command(&mut gateway, |c| matches!(c, ProviderCommand::CreateConnection { .. })).await?;
    assert_eq!(provider, ProviderId::from("telephony"));
    match command {
        ProviderCommand::CreateConnection {
            call_id,
            account,
            is_incoming,
            ..
        } => {
            assert_eq!(call_id, call);
            assert_eq!(account, sim());
            assert!(!is_incoming);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(telecom.foreground_call().await?, Some(call));
    assert!(!telecom.can_add_call().await?);

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_subscribers_see_call_lifecycle() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let telecom = builder.spawn()?;
    let (tx, mut events) = mpsc::unbounded_channel();
    telecom.subscribe(EventSubscription::all_events(Arc::new(ChannelEvents { tx })));

    let call = active_call(&telecom, &mut gateway).await?;
    let mut added = false;
    let mut activated = false;
    while !(added && activated) {
        match timeout(WAIT, events.recv()).await? {
            Some(TelecomEvent::CallAdded { call: snapshot }) if snapshot.call_id == call => added = true,
            Some(TelecomEvent::CallStateChanged { call_id, new, .. })
                if call_id == call && new == CallState::Active =>
            {
                // CallAdded is always delivered first
                assert!(added);
                activated = true;
            }
            Some(_) => {}
            None => anyhow::bail!("event channel closed"),
        }
    }

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_incoming_call_without_filter_rings() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let telecom = builder.spawn()?;

    let call = telecom
        .process_incoming_call(sim(), Some(Address::tel("5550199")))
        .await?;
    let (_, command) =
        next_command(&mut gateway, |c| matches!(c, ProviderCommand::CreateConnection { .. })).await?;
    assert!(matches!(command, ProviderCommand::CreateConnection { is_incoming: true, .. }));

    telecom
        .provider_event(ProviderEvent::ConnectionCreated {
            call_id: call.clone(),
            info: ConnectionInfo::default(),
        })
        .await?;
    let snapshot = telecom.snapshot(&call).await?.expect("call is tracked");
    assert_eq!(snapshot.state, CallState::Ringing);

    assert!(telecom.on_media_button(MediaButton::ShortPress).await?);
    next_command(&mut gateway, |c| matches!(c, ProviderCommand::Answer { .. })).await?;

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_blocked_incoming_call_is_rejected_and_logged() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let telecom = builder.call_filter(Arc::new(BlockAll)).spawn()?;
    let (tx, mut events) = mpsc::unbounded_channel();
    telecom.subscribe(EventSubscription::all_events(Arc::new(ChannelEvents { tx })));

    let call = telecom
        .process_incoming_call(sim(), Some(Address::tel("5550199")))
        .await?;
    telecom
        .provider_event(ProviderEvent::ConnectionCreated {
            call_id: call.clone(),
            info: ConnectionInfo::default(),
        })
        .await?;

    let (_, command) = next_command(&mut gateway, |c| matches!(c, ProviderCommand::Reject { .. })).await?;
    assert_eq!(command.call_id(), &call);

    loop {
        match timeout(WAIT, events.recv()).await? {
            Some(TelecomEvent::LogRequested {
                call: snapshot,
                disposition,
                notify,
            }) => {
                assert_eq!(snapshot.call_id, call);
                assert_eq!(disposition, CallDisposition::Missed);
                assert!(!notify);
                break;
            }
            Some(TelecomEvent::CallAdded { .. }) => anyhow::bail!("blocked call was shown"),
            Some(_) => {}
            None => anyhow::bail!("event channel closed"),
        }
    }
    assert!(telecom.calls().await?.is_empty());

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_post_dial_tone_stops_after_delay() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let (tx, mut tones) = mpsc::unbounded_channel();
    let telecom = builder.tone_player(Arc::new(ChannelTones { tx })).spawn()?;

    let call = active_call(&telecom, &mut gateway).await?;
    let started = tokio::time::Instant::now();
    telecom
        .provider_event(ProviderEvent::OnPostDialChar {
            call_id: call.clone(),
            c: '5',
        })
        .await?;

    assert_eq!(timeout(WAIT, tones.recv()).await?, Some(ToneCommand::Play('5')));
    assert_eq!(timeout(WAIT, tones.recv()).await?, Some(ToneCommand::Stop));
    assert!(started.elapsed() >= Duration::from_millis(300));

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_audio_commands_reach_route_engine() -> anyhow::Result<()> {
    let (builder, mut gateway) = builder();
    let telecom = builder.spawn()?;
    active_call(&telecom, &mut gateway).await?;

    telecom.set_audio_route(AudioRoute::Speaker).await?;
    telecom.mute(true).await?;
    let state = telecom.audio_state().await?;
    assert_eq!(state.route, AudioRoute::Speaker);
    assert!(state.muted);

    // earlier updates carry the earpiece route; wait for the speaker one
    next_command(&mut gateway, |c| {
        matches!(c, ProviderCommand::AudioStateChanged { state, .. } if state.route == AudioRoute::Speaker)
    })
    .await?;

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_request_errors_come_back_to_caller() -> anyhow::Result<()> {
    let (builder, _gateway) = builder();
    let telecom = builder.spawn()?;

    let err = telecom
        .hold_call(&CallId::from("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, TelecomError::CallNotFound { .. }));
    assert!(err.is_request_error());

    let err = telecom
        .unregister_account(AccountHandle::new("voip", "nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, TelecomError::AccountNotFound { .. }));

    telecom.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_the_service() -> anyhow::Result<()> {
    let (builder, _gateway) = builder();
    let telecom = builder.spawn()?;
    let clone = telecom.clone();
    assert!(telecom.is_running());

    telecom.shutdown().await?;
    assert!(!clone.is_running());
    let err = clone.can_add_call().await.unwrap_err();
    assert!(matches!(err, TelecomError::ServiceUnavailable { .. }));
    Ok(())
}

#[tokio::test]
async fn test_builder_requires_gateway() {
    let err = TelecomServiceBuilder::new().spawn().unwrap_err();
    assert!(matches!(err, TelecomError::Configuration { .. }));
}
