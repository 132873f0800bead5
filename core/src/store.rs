//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The purchase flow calls store methods; it never executes SQL directly.

use crate::{
    config::{ItemPayload, PacketConfig},
    error::GachaResult,
    ledger::Candidate,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRow {
    pub packet_id: String,
    pub label: String,
    pub cost: i64,
    pub currency: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub purchase_id: String,
    pub unit_index: u32,
    pub player_id: String,
    pub packet_id: String,
    pub item_id: String,
    pub cost: i64,
    pub currency: String,
    pub roll: u64,
    pub random_source: String,
    pub total_percent: String,
    pub status: String, // granted | refunded
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub purchase_id: String,
    pub item_id: String,
    pub reward: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct GachaStore {
    conn: Connection,
}

impl GachaStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> GachaResult<Self> {
        let conn = Connection::open(path)?;
        // WAL only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> GachaResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> GachaResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_gacha.sql"))?;
        Ok(())
    }

    /// Start a transaction. Store calls made before it is committed or
    /// dropped are part of it; dropping without commit rolls back.
    pub fn transaction(&self) -> GachaResult<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ── Catalogue ──────────────────────────────────────────────

    /// Insert or update a packet and its items. Existing items keep
    /// their position in draw order.
    pub fn upsert_packet(&self, packet: &PacketConfig) -> GachaResult<()> {
        let tx = self.transaction()?;
        self.conn.execute(
            "INSERT INTO packet (packet_id, label, cost, currency, active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(packet_id) DO UPDATE SET
                label = excluded.label, cost = excluded.cost,
                currency = excluded.currency, active = excluded.active",
            params![
                packet.packet_id,
                packet.label,
                packet.cost,
                packet.currency,
                packet.active,
            ],
        )?;
        for item in &packet.items {
            self.conn.execute(
                "INSERT INTO packet_item (packet_id, item_id, prob_rate, rarity, reward, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(packet_id, item_id) DO UPDATE SET
                    prob_rate = excluded.prob_rate, rarity = excluded.rarity,
                    reward = excluded.reward, active = excluded.active",
                params![
                    packet.packet_id,
                    item.item_id,
                    item.prob_rate,
                    item.rarity,
                    serde_json::to_string(&item.reward)?,
                    item.active,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns false if no such item exists.
    pub fn set_item_active(&self, packet_id: &str, item_id: &str, active: bool) -> GachaResult<bool> {
        let changed = self.conn.execute(
            "UPDATE packet_item SET active = ?3 WHERE packet_id = ?1 AND item_id = ?2",
            params![packet_id, item_id, active],
        )?;
        Ok(changed == 1)
    }

    /// Returns false if no such item exists.
    pub fn set_item_rate(&self, packet_id: &str, item_id: &str, prob_rate: &str) -> GachaResult<bool> {
        let changed = self.conn.execute(
            "UPDATE packet_item SET prob_rate = ?3 WHERE packet_id = ?1 AND item_id = ?2",
            params![packet_id, item_id, prob_rate],
        )?;
        Ok(changed == 1)
    }

    pub fn packet(&self, packet_id: &str) -> GachaResult<Option<PacketRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT packet_id, label, cost, currency, active FROM packet WHERE packet_id = ?1",
                params![packet_id],
                |row| {
                    Ok(PacketRow {
                        packet_id: row.get(0)?,
                        label:     row.get(1)?,
                        cost:      row.get(2)?,
                        currency:  row.get(3)?,
                        active:    row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// The current draw-set: active items only, in draw order.
    pub fn active_candidates(&self, packet_id: &str) -> GachaResult<Vec<Candidate<ItemPayload>>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, prob_rate, rarity, reward FROM packet_item
             WHERE packet_id = ?1 AND active = 1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![packet_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(item_id, prob_rate, rarity, reward)| -> GachaResult<_> {
                let payload = ItemPayload {
                    item_id: item_id.clone(),
                    rarity,
                    reward: serde_json::from_str(&reward)?,
                };
                Ok(Candidate::new(item_id, prob_rate, payload))
            })
            .collect()
    }

    // ── Wallet ─────────────────────────────────────────────────

    pub fn balance(&self, player_id: &str, currency: &str) -> GachaResult<i64> {
        let balance = self
            .conn
            .query_row(
                "SELECT balance FROM wallet WHERE player_id = ?1 AND currency = ?2",
                params![player_id, currency],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    pub fn credit(&self, player_id: &str, currency: &str, amount: i64) -> GachaResult<()> {
        self.conn.execute(
            "INSERT INTO wallet (player_id, currency, balance) VALUES (?1, ?2, ?3)
             ON CONFLICT(player_id, currency) DO UPDATE SET balance = balance + excluded.balance",
            params![player_id, currency, amount],
        )?;
        Ok(())
    }

    /// Deduct `amount` only if the balance covers it. Returns whether the
    /// debit happened.
    pub fn try_debit(&self, player_id: &str, currency: &str, amount: i64) -> GachaResult<bool> {
        let changed = self.conn.execute(
            "UPDATE wallet SET balance = balance - ?3
             WHERE player_id = ?1 AND currency = ?2 AND balance >= ?3",
            params![player_id, currency, amount],
        )?;
        Ok(changed == 1)
    }

    // ── Purchase history ───────────────────────────────────────

    pub fn insert_purchase(&self, record: &PurchaseRecord) -> GachaResult<()> {
        self.conn.execute(
            "INSERT INTO purchase_history
                (purchase_id, unit_index, player_id, packet_id, item_id, cost, currency,
                 roll, random_source, total_percent, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.purchase_id,
                record.unit_index,
                record.player_id,
                record.packet_id,
                record.item_id,
                record.cost,
                record.currency,
                record.roll as i64,
                record.random_source,
                record.total_percent,
                record.status,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Returns the number of rows marked.
    pub fn mark_refunded(&self, purchase_id: &str) -> GachaResult<usize> {
        let changed = self.conn.execute(
            "UPDATE purchase_history SET status = 'refunded' WHERE purchase_id = ?1",
            params![purchase_id],
        )?;
        Ok(changed)
    }

    pub fn purchases_for(&self, player_id: &str) -> GachaResult<Vec<PurchaseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT purchase_id, unit_index, player_id, packet_id, item_id, cost, currency,
                    roll, random_source, total_percent, status, created_at
             FROM purchase_history WHERE player_id = ?1
             ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![player_id], |row| {
                Ok(PurchaseRecord {
                    purchase_id:   row.get(0)?,
                    unit_index:    row.get(1)?,
                    player_id:     row.get(2)?,
                    packet_id:     row.get(3)?,
                    item_id:       row.get(4)?,
                    cost:          row.get(5)?,
                    currency:      row.get(6)?,
                    roll:          row.get::<_, i64>(7)? as u64,
                    random_source: row.get(8)?,
                    total_percent: row.get(9)?,
                    status:        row.get(10)?,
                    created_at:    timestamp_column(row, 11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ── Reward mailbox ─────────────────────────────────────────

    pub fn enqueue_reward(
        &self,
        player_id: &str,
        purchase_id: &str,
        item_id: &str,
        reward: &serde_json::Value,
    ) -> GachaResult<()> {
        self.conn.execute(
            "INSERT INTO reward_mailbox (player_id, purchase_id, item_id, reward, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                player_id,
                purchase_id,
                item_id,
                serde_json::to_string(reward)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn mailbox_for(&self, player_id: &str) -> GachaResult<Vec<MailboxEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT purchase_id, item_id, reward, created_at FROM reward_mailbox
             WHERE player_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![player_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    timestamp_column(row, 3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(purchase_id, item_id, reward, created_at)| -> GachaResult<_> {
                Ok(MailboxEntry {
                    purchase_id,
                    item_id,
                    reward: serde_json::from_str(&reward)?,
                    created_at,
                })
            })
            .collect()
    }
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
