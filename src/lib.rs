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

//! # Invoice Engine
//!
//! This library manages customers and invoices for a small business: creating
//! customers, building invoices out of line items, walking invoices through
//! their lifecycle, and recording payments, while guaranteeing that
//! concurrent operations against the same entity never corrupt totals or
//! violate lifecycle rules.
//!
//! ## Core Components
//!
//! - [`InvoiceService`]: Public API combining locking, validation, and storage
//! - [`Invoice`]: The lifecycle state machine and money arithmetic
//! - [`LockManager`]: Fair per-entity leases serializing mutations
//! - [`EntityStore`] / [`MemoryStore`]: Key-addressed record persistence
//! - [`BillingError`]: Typed failures for every operation
//!
//! ## Example
//!
//! ```
//! use invoice_engine_rs::{InvoiceService, NewCustomer, NewInvoice};
//! use rust_decimal_macros::dec;
//!
//! let service = InvoiceService::new();
//!
//! let customer = service
//!     .create_customer(NewCustomer {
//!         name: "Acme Ltd".into(),
//!         email: "billing@acme.test".into(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let invoice = service
//!     .create_invoice(customer.id, NewInvoice::default())
//!     .unwrap();
//! let invoice = service
//!     .add_invoice_item(invoice.id, "Widget", dec!(2), dec!(10.00))
//!     .unwrap();
//!
//! // default configuration applies 17% VAT to tax invoices
//! assert_eq!(invoice.subtotal, dec!(20.00));
//! assert_eq!(invoice.total, dec!(23.40));
//! ```
//!
//! ## Thread Safety
//!
//! Share one [`InvoiceService`] behind an `Arc` across threads. Mutations on
//! one entity apply first-come-first-served; mutations on different entities
//! run in parallel.

pub mod config;
pub mod error;
pub mod invoice;
mod base;
mod customer;
mod lock;
mod outbox;
mod report;
mod service;
mod store;

pub use base::{CustomerId, InvoiceId, LineItemId};
pub use config::{BillingConfig, ConfigHandle};
pub use customer::{Customer, CustomerUpdate, NewCustomer};
pub use error::BillingError;
pub use invoice::{Invoice, InvoiceStatus, InvoiceType, LineItem, Payment};
pub use lock::{EntityKind, Lease, LockManager};
pub use outbox::{DispatchOutbox, DispatchRequest};
pub use report::Statistics;
pub use service::{InvoiceService, NewInvoice};
pub use store::{EntityStore, InvoiceOrder, InvoiceQuery, MemoryStore};
