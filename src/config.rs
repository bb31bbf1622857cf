// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Billing configuration.
//!
//! Totals are always computed from a [`BillingConfig`] snapshot taken at call
//! time, never from values baked into an invoice at creation. Swapping the
//! configuration through a [`ConfigHandle`] therefore affects the next
//! computation and nothing that already committed.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Immutable snapshot of the billing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    /// VAT fraction applied to VAT-liable invoice types (e.g. `0.17`).
    pub vat_rate: Decimal,
    /// Currency code stamped on invoices when totals are computed.
    pub currency: String,
    /// Serial-number prefix for standard and tax invoices.
    pub invoice_prefix: String,
    /// Serial-number prefix for credit notes.
    pub credit_note_prefix: String,
    /// Default payment terms in days, used by callers that derive a due date.
    pub payment_terms_days: i64,
    /// Upper bound on the wait for an entity lease.
    pub lock_timeout: Duration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            vat_rate: dec!(0.17),
            currency: "ILS".to_string(),
            invoice_prefix: "INV".to_string(),
            credit_note_prefix: "CRN".to_string(),
            payment_terms_days: 30,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl BillingConfig {
    /// Loads configuration from environment variables.
    ///
    /// Recognized variables: `VAT_RATE`, `CURRENCY`, `INVOICE_PREFIX`,
    /// `CREDIT_NOTE_PREFIX`, `PAYMENT_TERMS`, `LOCK_TIMEOUT_SECS`. Unset or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            vat_rate: env_parse("VAT_RATE").unwrap_or(defaults.vat_rate),
            currency: env::var("CURRENCY").unwrap_or(defaults.currency),
            invoice_prefix: env::var("INVOICE_PREFIX").unwrap_or(defaults.invoice_prefix),
            credit_note_prefix: env::var("CREDIT_NOTE_PREFIX")
                .unwrap_or(defaults.credit_note_prefix),
            payment_terms_days: env_parse("PAYMENT_TERMS").unwrap_or(defaults.payment_terms_days),
            lock_timeout: env_parse("LOCK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_timeout),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.parse().ok()
}

/// Shared, swappable configuration handle.
///
/// Cloning the handle shares the underlying settings; [`ConfigHandle::update`]
/// is visible to every holder on their next [`ConfigHandle::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<BillingConfig>>,
}

impl ConfigHandle {
    pub fn new(config: BillingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns the current settings by value.
    pub fn snapshot(&self) -> BillingConfig {
        self.inner.read().clone()
    }

    /// Replaces the settings; takes effect on the next snapshot.
    pub fn update(&self, config: BillingConfig) {
        *self.inner.write() = config;
    }
}
