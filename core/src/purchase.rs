//! Packet purchase flow: the caller side of the selector.
//!
//! ORDER (fixed):
//!   1. Check quantity and packet.
//!   2. Validate the current draw-set. A broken configuration stops here,
//!      before any charge.
//!   3. In one transaction: debit, then draw each unit independently
//!      against a freshly fetched draw-set, writing one history row per
//!      unit. Any failure rolls back the debit and the rows together.
//!   4. Deliver rewards. If delivery fails, refund and mark the rows.

use crate::{
    config::{ItemPayload, ValidationSettings},
    error::{GachaError, GachaResult},
    ledger::{build_weight_table, validate, LedgerDiagnostics, ValidationError, ValidationFailure, ValidationOptions},
    rng::RandomSource,
    selector::{select, DrawFailure},
    store::{GachaStore, PurchaseRecord},
    types::{PacketId, PlayerId, Weight},
};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantedItem {
    pub unit_index: u32,
    pub item_id: String,
    pub rarity: Option<String>,
    pub reward: serde_json::Value,
    pub roll: Weight,
    pub random_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub purchase_id: String,
    pub player_id: PlayerId,
    pub packet_id: PacketId,
    pub quantity: u32,
    pub total_cost: i64,
    pub currency: String,
    pub balance_after: i64,
    pub items: Vec<GrantedItem>,
}

/// Hands granted rewards to the player (mail, inventory, ...).
pub trait RewardSink {
    fn deliver(&mut self, player_id: &str, purchase_id: &str, items: &[GrantedItem]) -> GachaResult<()>;
}

/// Delivers rewards into the store's reward mailbox.
pub struct MailboxSink<'s> {
    store: &'s GachaStore,
}

impl<'s> MailboxSink<'s> {
    pub fn new(store: &'s GachaStore) -> Self {
        Self { store }
    }
}

impl RewardSink for MailboxSink<'_> {
    fn deliver(&mut self, player_id: &str, purchase_id: &str, items: &[GrantedItem]) -> GachaResult<()> {
        let tx = self.store.transaction()?;
        for item in items {
            self.store
                .enqueue_reward(player_id, purchase_id, &item.item_id, &item.reward)?;
        }
        tx.commit()?;
        Ok(())
    }
}

pub struct PurchaseService<'s> {
    store: &'s GachaStore,
    options: ValidationOptions,
    max_units: u32,
}

impl<'s> PurchaseService<'s> {
    pub fn new(store: &'s GachaStore, settings: &ValidationSettings) -> GachaResult<Self> {
        Ok(Self {
            store,
            options: settings.to_options()?,
            max_units: settings.max_units_per_purchase,
        })
    }

    pub fn purchase(
        &self,
        player_id: &str,
        packet_id: &str,
        quantity: u32,
        rng: &mut dyn RandomSource,
        sink: &mut dyn RewardSink,
    ) -> GachaResult<PurchaseReceipt> {
        if quantity == 0 || quantity > self.max_units {
            return Err(GachaError::InvalidQuantity {
                quantity,
                max: self.max_units,
            });
        }

        let packet = self
            .store
            .packet(packet_id)?
            .ok_or_else(|| GachaError::PacketNotFound {
                packet_id: packet_id.into(),
            })?;
        if !packet.active {
            return Err(GachaError::PacketInactive {
                packet_id: packet_id.into(),
            });
        }

        self.check_draw_set(packet_id)?;

        let total_cost = packet
            .cost
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| anyhow::anyhow!("cost overflow: {} x {quantity}", packet.cost))?;

        let purchase_id = Uuid::new_v4().to_string();
        let tx = self.store.transaction()?;

        if !self.store.try_debit(player_id, &packet.currency, total_cost)? {
            return Err(GachaError::InsufficientFunds {
                currency: packet.currency.clone(),
                required: total_cost,
                available: self.store.balance(player_id, &packet.currency)?,
            });
        }

        let mut items = Vec::with_capacity(quantity as usize);
        for unit_index in 0..quantity {
            // Each unit is an independent trial against the current rates.
            let candidates = self.store.active_candidates(packet_id)?;
            let result = select(&candidates, &self.options, rng);

            let (Some(winner), Some(roll), Some(source)) = (
                result.payload(),
                result.diagnostics.roll,
                result.diagnostics.random_source,
            ) else {
                let failure = rejection(result.diagnostics.failure, result.diagnostics.ledger);
                error!("purchase {purchase_id} aborted at unit {unit_index}: {failure}");
                return Err(failure.into());
            };

            self.store.insert_purchase(&PurchaseRecord {
                purchase_id: purchase_id.clone(),
                unit_index,
                player_id: player_id.into(),
                packet_id: packet_id.into(),
                item_id: winner.item_id.clone(),
                cost: packet.cost,
                currency: packet.currency.clone(),
                roll,
                random_source: source.as_str().into(),
                total_percent: result.diagnostics.ledger.total_percent.clone(),
                status: "granted".into(),
                created_at: Utc::now(),
            })?;
            items.push(granted(unit_index, winner, roll, source.as_str()));
        }
        tx.commit()?;

        if let Err(e) = sink.deliver(player_id, &purchase_id, &items) {
            return Err(self.refund(player_id, &purchase_id, &packet.currency, total_cost, e));
        }

        let balance_after = self.store.balance(player_id, &packet.currency)?;
        info!(
            "purchase {purchase_id}: {player_id} bought {quantity} x {packet_id} for {total_cost} {}",
            packet.currency
        );
        Ok(PurchaseReceipt {
            purchase_id,
            player_id: player_id.into(),
            packet_id: packet_id.into(),
            quantity,
            total_cost,
            currency: packet.currency,
            balance_after,
            items,
        })
    }

    /// Reject a broken draw-set before anything is charged.
    fn check_draw_set(&self, packet_id: &str) -> GachaResult<()> {
        let candidates = self.store.active_candidates(packet_id)?;
        let table = build_weight_table(&candidates);
        if let Err(failure) = validate(&table, &self.options) {
            error!("packet {packet_id} rejected: {failure}");
            return Err(failure.into());
        }
        Ok(())
    }

    fn refund(
        &self,
        player_id: &str,
        purchase_id: &str,
        currency: &str,
        amount: i64,
        cause: GachaError,
    ) -> GachaError {
        warn!("delivery failed for purchase {purchase_id}: {cause}; refunding {amount} {currency}");
        let refunded = self
            .store
            .transaction()
            .and_then(|tx| {
                self.store.credit(player_id, currency, amount)?;
                self.store.mark_refunded(purchase_id)?;
                tx.commit()?;
                Ok(())
            });
        if let Err(e) = &refunded {
            error!("refund of purchase {purchase_id} failed: {e}");
        } else {
            info!("purchase {purchase_id} refunded {amount} {currency} to {player_id}");
        }
        GachaError::Delivery {
            purchase_id: purchase_id.into(),
            reason: cause.to_string(),
            refunded: refunded.is_ok(),
        }
    }
}

fn granted(unit_index: u32, payload: &ItemPayload, roll: Weight, source: &str) -> GrantedItem {
    GrantedItem {
        unit_index,
        item_id: payload.item_id.clone(),
        rarity: payload.rarity.clone(),
        reward: payload.reward.clone(),
        roll,
        random_source: source.into(),
    }
}

/// Express a failed draw as the validation failure the caller reports.
fn rejection(failure: Option<DrawFailure>, diagnostics: LedgerDiagnostics) -> ValidationFailure {
    let error = match failure {
        Some(DrawFailure::Validation { error }) => error,
        _ => ValidationError::ZeroTotalWeight,
    };
    ValidationFailure { error, diagnostics }
}
