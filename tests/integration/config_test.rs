//! Configuration loading

use binance_bridge::config::Config;

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.upstream.url, "wss://stream.binance.com:9443");
    assert_eq!(config.bus.subject, "binance.websocket.data");
}

#[test]
fn test_zero_config_is_complete() {
    // The bridge must be runnable with no configuration file at all.
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert!(!config.upstream.streams.is_empty());
    assert!(!config.bus.subject.is_empty());
}
