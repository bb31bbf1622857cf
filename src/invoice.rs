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

//! Invoice lifecycle management.
//!
//! Implemented state machine:
//!
//  Draft ──issue──► Issued ──send──► Sent ──payment──► PartiallyPaid ──payment──► Paid
//    │                 │
//    └────cancel───────┴──► Cancelled
//!
//! Explicit status changes consult a single transition table
//! ([`InvoiceStatus::can_transition_to`]). Payments advance the status on
//! their own gated path: an invoice in `Issued`, `Sent`, or `PartiallyPaid`
//! accepts payments and moves to `PartiallyPaid` or `Paid` in the same step
//! that records the payment.
//!
//! `Overdue` is not a stored status. It is derived at read time from the due
//! date and a non-terminal status via [`Invoice::is_overdue`].

use crate::base::{CustomerId, InvoiceId, LineItemId};
use crate::config::BillingConfig;
use crate::error::BillingError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places of the currency minor unit used for tax rounding.
const MINOR_UNIT_SCALE: u32 = 2;

const MAX_DESCRIPTION: usize = 500;
const MAX_NOTES: usize = 2000;

/// Kinds of billing documents. Only tax invoices are VAT-liable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Standard,
    #[default]
    TaxInvoice,
    CreditNote,
}

impl InvoiceType {
    /// Whether VAT applies to documents of this type.
    pub fn vat_liable(self) -> bool {
        matches!(self, Self::TaxInvoice)
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::TaxInvoice => "tax_invoice",
            Self::CreditNote => "credit_note",
        };
        write!(f, "{name}")
    }
}

impl FromStr for InvoiceType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "tax_invoice" => Ok(Self::TaxInvoice),
            "credit_note" => Ok(Self::CreditNote),
            other => Err(BillingError::Validation(format!(
                "unknown invoice type: {other}"
            ))),
        }
    }
}

/// Stored invoice statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Sent,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    /// All stored statuses, in lifecycle order.
    pub const ALL: [InvoiceStatus; 6] = [
        Self::Draft,
        Self::Issued,
        Self::Sent,
        Self::PartiallyPaid,
        Self::Paid,
        Self::Cancelled,
    ];

    /// Transition table for explicit status changes.
    ///
    /// | From            | To                    |
    /// |-----------------|-----------------------|
    /// | `Draft`         | `Issued`, `Cancelled` |
    /// | `Issued`        | `Sent`, `Cancelled`   |
    /// | `Sent`          | `PartiallyPaid`, `Paid` |
    /// | `PartiallyPaid` | `Paid`                |
    /// | `Paid`          | (terminal)            |
    /// | `Cancelled`     | (terminal)            |
    ///
    /// A same-status "transition" is not in the table and is rejected rather
    /// than silently accepted.
    pub fn can_transition_to(self, target: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Issued)
                | (Draft, Cancelled)
                | (Issued, Sent)
                | (Issued, Cancelled)
                | (Sent, PartiallyPaid)
                | (Sent, Paid)
                | (PartiallyPaid, Paid)
        )
    }

    /// Statuses that accept payments.
    pub fn payable(self) -> bool {
        matches!(self, Self::Issued | Self::Sent | Self::PartiallyPaid)
    }

    /// Non-terminal statuses with money outstanding; only these can go overdue.
    pub fn outstanding(self) -> bool {
        matches!(self, Self::Issued | Self::Sent | Self::PartiallyPaid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Sent => "sent",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "issued" => Ok(Self::Issued),
            "sent" => Ok(Self::Sent),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(BillingError::Validation(format!(
                "unknown invoice status: {other}"
            ))),
        }
    }
}

/// One billable row on an invoice. Immutable once added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    /// Validates the fields and builds the item.
    pub fn new(
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<Self, BillingError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(BillingError::Validation(
                "line item description must not be empty".into(),
            ));
        }
        if description.len() > MAX_DESCRIPTION {
            return Err(BillingError::Validation(format!(
                "line item description exceeds {MAX_DESCRIPTION} characters"
            )));
        }
        if quantity <= Decimal::ZERO {
            return Err(BillingError::Validation("quantity must be positive".into()));
        }
        if unit_price < Decimal::ZERO {
            return Err(BillingError::Validation(
                "unit price must not be negative".into(),
            ));
        }
        Ok(Self {
            id: LineItemId::new(),
            description,
            quantity,
            unit_price,
        })
    }

    /// `quantity * unit_price`, before VAT.
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// An append-only payment record owned by one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Decimal,
    pub method: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// The central billing record.
///
/// # Invariants
///
/// - `total == subtotal + tax_amount`, recomputed whenever items change.
/// - `tax_amount` is `subtotal * vat_rate` rounded half-up to the currency
///   minor unit for VAT-liable types, zero otherwise.
/// - `amount_paid` is the sum of `payments` and never exceeds `total`.
/// - Items change only in `Draft`; leaving `Draft` for `Issued` requires at
///   least one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Human-readable serial, e.g. `INV-2026-000042`.
    pub number: String,
    /// Owning customer; immutable after creation.
    pub customer_id: CustomerId,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    /// Line items in insertion order. Order matters for display only.
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Builds a new draft invoice with no items.
    pub fn new(
        customer_id: CustomerId,
        number: String,
        invoice_type: InvoiceType,
        due_date: Option<NaiveDate>,
        notes: Option<String>,
        config: &BillingConfig,
    ) -> Result<Self, BillingError> {
        if let Some(notes) = &notes {
            if notes.len() > MAX_NOTES {
                return Err(BillingError::Validation(format!(
                    "notes exceed {MAX_NOTES} characters"
                )));
            }
        }
        let now = Utc::now();
        Ok(Self {
            id: InvoiceId::new(),
            number,
            customer_id,
            invoice_type,
            status: InvoiceStatus::Draft,
            items: Vec::new(),
            payments: Vec::new(),
            issue_date: now.date_naive(),
            due_date,
            notes,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            currency: config.currency.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// `total - amount_paid`.
    pub fn balance_due(&self) -> Decimal {
        self.total - self.amount_paid
    }

    /// Derived view: money outstanding past the due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.outstanding() && self.due_date.is_some_and(|due| due < today)
    }

    /// Appends a line item. Only legal while the invoice is a draft.
    pub fn add_item(&mut self, item: LineItem, config: &BillingConfig) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::NotEditable(self.status));
        }
        self.items.push(item);
        self.recompute_totals(config);
        self.touch();
        Ok(())
    }

    /// Removes a line item by id. Only legal while the invoice is a draft.
    pub fn remove_item(
        &mut self,
        item_id: LineItemId,
        config: &BillingConfig,
    ) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::NotEditable(self.status));
        }
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(BillingError::LineItemNotFound(item_id))?;
        self.items.remove(index);
        self.recompute_totals(config);
        self.touch();
        Ok(())
    }

    /// Moves the invoice to `target` if the transition table allows it.
    ///
    /// Issuing additionally requires at least one line item.
    pub fn change_status(&mut self, target: InvoiceStatus) -> Result<(), BillingError> {
        if !self.status.can_transition_to(target) {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        if target == InvoiceStatus::Issued && self.items.is_empty() {
            return Err(BillingError::Validation(
                "cannot issue an invoice with no line items".into(),
            ));
        }
        self.status = target;
        self.touch();
        Ok(())
    }

    /// Records a payment and advances the status in one step.
    ///
    /// Checks, in order: the amount is positive, the amount fits the balance
    /// due, and the current status accepts payments. A rejected payment
    /// leaves `amount_paid` and `status` untouched.
    pub fn apply_payment(
        &mut self,
        amount: Decimal,
        method: Option<String>,
    ) -> Result<(), BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "payment amount must be positive".into(),
            ));
        }
        let balance = self.balance_due();
        if amount > balance {
            return Err(BillingError::Overpayment { balance });
        }
        if !self.status.payable() {
            return Err(BillingError::NotPayable(self.status));
        }

        self.payments.push(Payment {
            amount,
            method,
            recorded_at: Utc::now(),
        });
        self.amount_paid += amount;
        self.status = if self.amount_paid == self.total {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };
        self.assert_invariants();
        self.touch();
        Ok(())
    }

    /// Recomputes subtotal, tax, and total from the items and the given
    /// configuration snapshot. VAT rounds half-up to the minor unit.
    pub fn recompute_totals(&mut self, config: &BillingConfig) {
        let subtotal: Decimal = self.items.iter().map(LineItem::line_total).sum();
        let tax_amount = if self.invoice_type.vat_liable() {
            (subtotal * config.vat_rate)
                .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };
        self.subtotal = subtotal;
        self.tax_amount = tax_amount;
        self.total = subtotal + tax_amount;
        self.currency = config.currency.clone();
        self.assert_invariants();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.total,
            self.subtotal + self.tax_amount,
            "Invariant violated: total != subtotal + tax"
        );
        debug_assert!(
            self.amount_paid >= Decimal::ZERO,
            "Invariant violated: amount_paid went negative: {}",
            self.amount_paid
        );
        debug_assert!(
            self.amount_paid <= self.total,
            "Invariant violated: amount_paid {} exceeds total {}",
            self.amount_paid,
            self.total
        );
    }
}
