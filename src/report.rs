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

//! Read-side statistics.
//!
//! Aggregates are folded from plain invoice listings; there is no separate
//! index to keep consistent.

use crate::invoice::{Invoice, InvoiceStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate business figures at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub customer_count: usize,
    pub invoice_count: usize,
    /// Invoice counts per status; every status is present, possibly zero.
    pub by_status: BTreeMap<String, usize>,
    /// Sum of totals over non-cancelled invoices.
    pub total_invoiced: Decimal,
    /// Sum of recorded payments.
    pub total_paid: Decimal,
    /// `total_invoiced - total_paid`.
    pub outstanding: Decimal,
}

impl Statistics {
    /// Folds the figures from a full invoice listing.
    pub fn compute(customer_count: usize, invoices: &[Invoice]) -> Self {
        let mut by_status: BTreeMap<String, usize> = InvoiceStatus::ALL
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect();
        let mut total_invoiced = Decimal::ZERO;
        let mut total_paid = Decimal::ZERO;

        for invoice in invoices {
            *by_status
                .entry(invoice.status.to_string())
                .or_insert(0) += 1;
            if invoice.status != InvoiceStatus::Cancelled {
                total_invoiced += invoice.total;
            }
            total_paid += invoice.amount_paid;
        }

        Self {
            customer_count,
            invoice_count: invoices.len(),
            by_status,
            total_invoiced,
            total_paid,
            outstanding: total_invoiced - total_paid,
        }
    }
}
