use crate::{
    ledger::{Candidate, ValidationOptions, DEFAULT_TOLERANCE_UNITS},
    report::RarityGuideline,
    types::PacketId,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

pub const DEFAULT_TOLERANCE_PERCENT: &str = "0.000001";
pub const DEFAULT_MAX_UNITS_PER_PURCHASE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_true")]
    pub require_total_100: bool,
    #[serde(default = "default_true")]
    pub strict_positive: bool,
    /// Percent, as a decimal string. Converted to fixed-point units on load.
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: String,
    #[serde(default = "default_max_units")]
    pub max_units_per_purchase: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            require_total_100: true,
            strict_positive: true,
            tolerance_percent: default_tolerance_percent(),
            max_units_per_purchase: DEFAULT_MAX_UNITS_PER_PURCHASE,
        }
    }
}

impl ValidationSettings {
    pub fn to_options(&self) -> anyhow::Result<ValidationOptions> {
        ValidationOptions {
            require_total_100: self.require_total_100,
            strict_positive: self.strict_positive,
            tolerance_units: DEFAULT_TOLERANCE_UNITS,
        }
        .with_tolerance_percent(&self.tolerance_percent)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "tolerance_percent {:?} is not a non-negative decimal",
                self.tolerance_percent
            )
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_tolerance_percent() -> String {
    DEFAULT_TOLERANCE_PERCENT.into()
}

fn default_max_units() -> u32 {
    DEFAULT_MAX_UNITS_PER_PURCHASE
}

// ── Packets ─────────────────────────────────────────────────────────────────

/// What a draw hands back to the caller. Opaque to the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub item_id: String,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub reward: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketItemConfig {
    pub item_id: String,
    /// Accepts a JSON string or number; numbers keep their decimal text.
    #[serde(deserialize_with = "rate_text")]
    pub prob_rate: String,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub reward: serde_json::Value,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PacketItemConfig {
    pub fn to_candidate(&self) -> Candidate<ItemPayload> {
        Candidate::new(
            self.item_id.clone(),
            self.prob_rate.clone(),
            ItemPayload {
                item_id: self.item_id.clone(),
                rarity: self.rarity.clone(),
                reward: self.reward.clone(),
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketConfig {
    pub packet_id: PacketId,
    pub label: String,
    /// Price of one unit, in `currency`.
    pub cost: i64,
    pub currency: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub items: Vec<PacketItemConfig>,
}

impl PacketConfig {
    /// Active items only, in configured order.
    pub fn active_candidates(&self) -> Vec<Candidate<ItemPayload>> {
        self.items
            .iter()
            .filter(|item| item.active)
            .map(PacketItemConfig::to_candidate)
            .collect()
    }
}

fn rate_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => {
            let text = number.to_string();
            positional(&text).ok_or_else(|| {
                D::Error::custom(format!("prob_rate {text} cannot be written as a decimal"))
            })
        }
        other => Err(D::Error::custom(format!(
            "prob_rate must be a string or number, got {other}"
        ))),
    }
}

/// Rewrite number text such as `5e-6` or `1.5e-7` as a plain decimal
/// (`0.000005`, `0.00000015`). Text without an exponent is returned as is.
fn positional(text: &str) -> Option<String> {
    let Some((mantissa, exponent)) = text.split_once(['e', 'E']) else {
        return Some(text.to_string());
    };
    let exponent: i32 = exponent.parse().ok()?;
    if exponent.unsigned_abs() > 400 {
        return None;
    }
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{int_part}{frac_part}");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Index of the decimal point within `digits` once the exponent is applied.
    let point = int_part.len() as i64 + i64::from(exponent);
    let body = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, frac) = digits.split_at(point as usize);
        format!("{whole}.{frac}")
    };
    Some(format!("{sign}{body}"))
}

#[derive(Debug, Clone, Deserialize)]
struct ValidationFile {
    #[serde(default)]
    validation: ValidationSettings,
    #[serde(default = "RarityGuideline::defaults")]
    rarity_guidelines: Vec<RarityGuideline>,
}

#[derive(Debug, Clone, Deserialize)]
struct PacketsFile {
    packets: Vec<PacketConfig>,
}

// ── Top level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GachaConfig {
    pub validation: ValidationSettings,
    pub rarity_guidelines: Vec<RarityGuideline>,
    /// In file order.
    pub packets: Vec<PacketConfig>,
}

impl GachaConfig {
    /// Load from the data/ directory.
    /// In tests, use GachaConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let validation_path = format!("{data_dir}/gacha/validation.json");
        let validation_content = std::fs::read_to_string(&validation_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {validation_path}: {e}"))?;
        let validation_file: ValidationFile = serde_json::from_str(&validation_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {validation_path}: {e}"))?;

        let packets_path = format!("{data_dir}/gacha/packets.json");
        let packets_content = std::fs::read_to_string(&packets_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {packets_path}: {e}"))?;
        let packets_file: PacketsFile = serde_json::from_str(&packets_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {packets_path}: {e}"))?;

        let config = Self {
            validation: validation_file.validation,
            rarity_guidelines: validation_file.rarity_guidelines,
            packets: packets_file.packets,
        };
        // Fail at load time rather than on the first purchase.
        config.validation.to_options()?;
        Ok(config)
    }

    pub fn packet(&self, packet_id: &str) -> Option<&PacketConfig> {
        self.packets.iter().find(|p| p.packet_id == packet_id)
    }

    pub fn default_test() -> Self {
        let item = |item_id: &str, rate: &str, rarity: &str| PacketItemConfig {
            item_id: item_id.into(),
            prob_rate: rate.into(),
            rarity: Some(rarity.into()),
            reward: serde_json::json!({ "item": item_id, "amount": 1 }),
            active: true,
        };

        Self {
            validation: ValidationSettings::default(),
            rarity_guidelines: RarityGuideline::defaults(),
            packets: vec![
                PacketConfig {
                    packet_id: "starter".into(),
                    label: "Starter Packet".into(),
                    cost: 100,
                    currency: "gem".into(),
                    active: true,
                    items: vec![
                        item("sword_common", "50", "common"),
                        item("shield_rare", "30", "rare"),
                        item("helm_epic", "17.5", "epic"),
                        item("crown_legendary", "2.5", "legendary"),
                    ],
                },
                PacketConfig {
                    packet_id: "thirds".into(),
                    label: "Three-Way Split".into(),
                    cost: 10,
                    currency: "gold".into(),
                    active: true,
                    items: vec![
                        item("red", "33.3333333", "common"),
                        item("green", "33.3333333", "common"),
                        item("blue", "33.3333334", "common"),
                    ],
                },
                PacketConfig {
                    packet_id: "broken".into(),
                    label: "Misconfigured Packet".into(),
                    cost: 50,
                    currency: "gem".into(),
                    active: true,
                    items: vec![
                        item("left", "40", "common"),
                        item("right", "40", "common"),
                    ],
                },
                PacketConfig {
                    packet_id: "retired".into(),
                    label: "Retired Packet".into(),
                    cost: 1,
                    currency: "gem".into(),
                    active: false,
                    items: vec![item("relic", "100", "legendary")],
                },
            ],
        }
    }
}
