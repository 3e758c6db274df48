//! Tests against a real hub
//!
//! Run with `HA_URL` and `HA_TOKEN` set:
//!
//! ```text
//! cargo test -p ha-test-env --test live_hub -- --ignored
//! ```
//!
//! Each test skips itself when the environment lands in mock mode.

use anyhow::Result;
use ha_test_env::{init_test_logging, EnvironmentConfig, EnvironmentOptions, HassEnvironment};

fn live_config() -> EnvironmentConfig {
    EnvironmentConfig::with_options(EnvironmentOptions {
        mock_fallback: Some(true),
        ..EnvironmentOptions::default()
    })
}

#[tokio::test]
#[ignore]
async fn test_live_states_snapshot() -> Result<()> {
    init_test_logging();
    let mut env = HassEnvironment::node(live_config());
    env.setup().await?;

    let Some(hass) = env.globals().hass() else {
        eprintln!("Skipping: running in mock mode");
        return Ok(());
    };
    assert!(hass.connected);
    for (entity_id, entity) in &hass.states {
        assert_eq!(entity_id, &entity.entity_id);
        assert!(entity.last_updated >= entity.last_changed);
    }

    env.teardown().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_live_services_and_config() -> Result<()> {
    init_test_logging();
    let mut env = HassEnvironment::node(live_config());
    env.setup().await?;

    let Some(hass) = env.globals().hass() else {
        eprintln!("Skipping: running in mock mode");
        return Ok(());
    };
    assert!(hass.has_service("homeassistant", "reload_core_config"));
    assert!(!hass.config.version.is_empty());
    assert!(hass.config.components.iter().any(|c| c == "websocket_api"));

    let api = hass.call_api(ha_test_env::Method::GET, "/api/", None).await?;
    assert!(api.get("message").is_some());

    env.teardown().await?;
    Ok(())
}

#[cfg(feature = "dom")]
#[tokio::test]
#[ignore]
async fn test_live_dom_card() -> Result<()> {
    init_test_logging();
    let mut env = HassEnvironment::dom(live_config());
    env.setup().await?;

    let Some(entity) = env
        .globals()
        .hass()
        .and_then(|hass| hass.states.values().next().cloned())
    else {
        eprintln!("Skipping: mock mode or no entities");
        return Ok(());
    };

    if let Some(document) = env.base_mut().document_mut() {
        document.set_body(&format!(
            r#"<div class="custom-card" data-entity="{}"><span class="state">{}</span></div>"#,
            entity.entity_id, entity.state
        ));
    }
    let document = env.base().document().expect("document exists after setup");
    assert_eq!(document.select_text(".state")?, vec![entity.state.clone()]);
    assert_eq!(
        document.select_attr(".custom-card", "data-entity")?,
        vec![entity.entity_id.clone()]
    );

    env.teardown().await?;
    Ok(())
}
