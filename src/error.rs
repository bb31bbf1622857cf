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

//! Error types for customer and invoice operations.

use crate::base::{CustomerId, InvoiceId, LineItemId};
use crate::invoice::InvoiceStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures surfaced by the billing core.
///
/// Every operation returns one of these as a typed value; nothing below the
/// service layer panics or swallows a failure. `LockTimeout` is the only
/// transient variant: callers may retry it, everything else is a caller or
/// state problem that a retry cannot fix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Malformed input (empty name, bad email, non-positive quantity, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced customer id does not exist
    #[error("customer not found: {0}")]
    CustomerNotFound(CustomerId),

    /// Referenced invoice id does not exist
    #[error("invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Referenced line item id does not exist on the invoice
    #[error("line item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// Another customer already uses this email
    #[error("email already in use: {0}")]
    DuplicateEmail(String),

    /// Requested status change is not in the transition table
    #[error("cannot transition invoice from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Line item mutation attempted outside draft status
    #[error("cannot modify invoice in {0} status")]
    NotEditable(InvoiceStatus),

    /// Payment attempted in a status that does not accept payments
    #[error("cannot record payment on {0} invoice")]
    NotPayable(InvoiceStatus),

    /// Payment would push the paid amount past the invoice total
    #[error("payment exceeds balance due of {balance}")]
    Overpayment { balance: Decimal },

    /// Customer deletion blocked by non-cancelled invoices
    #[error("customer {0} has non-cancelled invoices")]
    HasActiveInvoices(CustomerId),

    /// Entity lease not granted within the configured wait bound
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),
}
