//! Configuration loading tests.

use gacha_core::{
    config::{GachaConfig, PacketConfig, ValidationSettings},
    ledger::{build_weight_table, validate},
};

const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");

fn scratch_dir(validation_json: &str) -> String {
    let dir = std::env::temp_dir().join(format!("gacha-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("gacha")).unwrap();
    std::fs::write(dir.join("gacha/validation.json"), validation_json).unwrap();
    std::fs::write(
        dir.join("gacha/packets.json"),
        r#"{ "packets": [ { "packet_id": "p", "label": "P", "cost": 1, "currency": "gem",
             "items": [ { "item_id": "i", "prob_rate": 100 } ] } ] }"#,
    )
    .unwrap();
    dir.to_string_lossy().into_owned()
}

#[test]
fn shipped_data_loads_and_validates() {
    let config = GachaConfig::load(DATA_DIR).expect("load data dir");
    let options = config.validation.to_options().unwrap();
    assert_eq!(options.tolerance_units, 10);
    assert!(!config.packets.is_empty());

    for packet in &config.packets {
        let candidates = packet.active_candidates();
        let table = build_weight_table(&candidates);
        assert!(
            validate(&table, &options).is_ok(),
            "{} does not sum to 100%: {}",
            packet.packet_id,
            table.diagnostics().total_percent
        );
    }
}

#[test]
fn numeric_rates_keep_their_decimal_text() {
    let config = GachaConfig::load(DATA_DIR).unwrap();
    let premium = config.packet("premium").unwrap();
    let rates: Vec<&str> = premium.items.iter().map(|i| i.prob_rate.as_str()).collect();
    assert_eq!(rates, vec!["60", "35.5", "4.5"]);
}

#[test]
fn inactive_items_are_not_candidates() {
    let config = GachaConfig::load(DATA_DIR).unwrap();
    let daily = config.packet("daily_basic").unwrap();
    let ids: Vec<String> = daily.active_candidates().into_iter().map(|c| c.id).collect();
    assert!(daily.items.iter().any(|i| i.item_id == "event_costume"));
    assert!(!ids.contains(&"event_costume".to_string()));
    assert_eq!(ids.len(), daily.items.len() - 1);
}

#[test]
fn missing_settings_fall_back_to_defaults() {
    let dir = scratch_dir("{}");
    let config = GachaConfig::load(&dir).unwrap();
    assert_eq!(config.validation, ValidationSettings::default());
    assert_eq!(config.rarity_guidelines.len(), 4);
    assert_eq!(config.packets[0].items[0].prob_rate, "100");
    assert!(config.packets[0].items[0].active);
}

#[test]
fn bad_tolerance_is_a_load_error() {
    let dir = scratch_dir(r#"{ "validation": { "tolerance_percent": "about 1e-6" } }"#);
    let err = GachaConfig::load(&dir).unwrap_err();
    assert!(err.to_string().contains("tolerance_percent"), "{err}");
}

#[test]
fn missing_directory_names_the_path() {
    let err = GachaConfig::load("/definitely/not/here").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here/gacha/validation.json"), "{err}");
}

fn packet_with_rates(rates: &str) -> PacketConfig {
    let items: Vec<String> = rates
        .split(',')
        .enumerate()
        .map(|(i, rate)| format!(r#"{{ "item_id": "i{i}", "prob_rate": {} }}"#, rate.trim()))
        .collect();
    let json = format!(
        r#"{{ "packet_id": "p", "label": "P", "cost": 1, "currency": "gem", "items": [{}] }}"#,
        items.join(",")
    );
    serde_json::from_str(&json).expect("packet parses")
}

/// Tiny numeric rates print in exponent form; they must still reach the
/// ledger as plain decimals.
#[test]
fn tiny_numeric_rates_become_plain_decimals() {
    let packet = packet_with_rates("99.999995, 0.000005");
    let rates: Vec<&str> = packet.items.iter().map(|i| i.prob_rate.as_str()).collect();
    assert_eq!(rates, vec!["99.999995", "0.000005"]);

    let candidates = packet.active_candidates();
    let table = build_weight_table(&candidates);
    assert!(table.diagnostics().invalid_items.is_empty());
    assert_eq!(table.diagnostics().total_percent, "100.0000000");
    assert!(validate(&table, &ValidationSettings::default().to_options().unwrap()).is_ok());

    let packet = packet_with_rates("99.9999999, 0.0000001, 1.5e-7, 2E1");
    let rates: Vec<&str> = packet.items.iter().map(|i| i.prob_rate.as_str()).collect();
    assert_eq!(rates, vec!["99.9999999", "0.0000001", "0.00000015", "20.0"]);
}

#[test]
fn non_numeric_rate_values_are_rejected() {
    let json = r#"{ "packet_id": "p", "label": "P", "cost": 1, "currency": "gem",
                    "items": [ { "item_id": "i", "prob_rate": true } ] }"#;
    let err = serde_json::from_str::<PacketConfig>(json).unwrap_err();
    assert!(err.to_string().contains("prob_rate"), "{err}");
}
