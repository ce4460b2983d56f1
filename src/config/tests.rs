use super::*;

#[test]
fn resilient_config_defaults_match_design() {
    let cfg = ResilientConfig::default();
    assert_eq!(cfg.base_delay_ms, 1000);
    assert_eq!(cfg.backoff_multiplier, 2.0);
    assert_eq!(cfg.max_attempts, 3);
    assert_eq!(cfg.circuit_failure_threshold, 5);
    assert_eq!(cfg.circuit_half_open_secs, 30);
}

#[test]
fn orchestrator_config_defaults_match_design() {
    let cfg = OrchestratorConfig::default();
    assert_eq!(cfg.max_waves, 3);
    assert_eq!(cfg.turn_timeout_secs, 600);
    assert_eq!(cfg.spawn_timeout_secs, 30);
    assert!(!cfg.parallel_crafters);
}

#[test]
fn provider_preset_round_trips_through_json() {
    let preset = ProviderPreset {
        command: "acp-agent".to_string(),
        args: vec!["--stdio".to_string()],
        env: HashMap::new(),
        auto_approve: Some(true),
        allowed_tools: None,
    };
    let json = serde_json::to_string(&preset).unwrap();
    let back: ProviderPreset = serde_json::from_str(&json).unwrap();
    assert_eq!(back.command, "acp-agent");
}
