//! Global subscriber installation; kept out of the library test binary
//! because `#[traced_test]` installs its own

use std::sync::Arc;

use async_trait::async_trait;
use serial_test::serial;

use rvoip_telecom_core::logging::{self, LogFormat, LoggingConfig};
use rvoip_telecom_core::prelude::*;

struct NullGateway;

#[async_trait]
impl ProviderGateway for NullGateway {
    async fn send(&self, _provider: &ProviderId, _command: ProviderCommand) -> TelecomResult<()> {
        Ok(())
    }
}

fn logging_config() -> LoggingConfig {
    LoggingConfig {
        install: true,
        filter: "rvoip_telecom_core=debug".to_string(),
        format: LogFormat::Compact,
        file_info: true,
    }
}

#[test]
#[serial]
fn test_second_subscriber_refused() {
    // whichever test runs first owns the process-wide subscriber
    logging::init(&logging_config()).ok();

    let err = logging::init(&logging_config()).unwrap_err();
    assert!(matches!(err, TelecomError::Configuration { .. }));
}

#[tokio::test]
#[serial]
async fn test_service_spawns_over_existing_subscriber() {
    logging::init(&logging_config()).ok();

    let config = TelecomConfig::new().with_logging(logging_config());
    let handle = TelecomServiceBuilder::new()
        .config(config)
        .gateway(Arc::new(NullGateway))
        .spawn()
        .unwrap();
    assert!(handle.calls().await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}
