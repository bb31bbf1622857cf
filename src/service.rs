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

//! The public customer/invoice API.
//!
//! [`InvoiceService`] combines the entity store, the lock manager, and the
//! lifecycle rules. Every mutating operation follows one discipline:
//!
//! 1. acquire the entity lease(s), customer before invoice,
//! 2. load the current record,
//! 3. validate and compute against a configuration snapshot,
//! 4. persist the whole record,
//! 5. release the lease by dropping it.
//!
//! Reads never take leases; they return the latest committed records and make
//! no snapshot guarantee against in-flight writes.

use crate::base::{CustomerId, InvoiceId, LineItemId};
use crate::config::ConfigHandle;
use crate::customer::{Customer, CustomerUpdate, NewCustomer};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus, InvoiceType, LineItem};
use crate::lock::{EntityKind, Lease, LockManager};
use crate::outbox::{DispatchOutbox, DispatchRequest};
use crate::report::Statistics;
use crate::store::{EntityStore, InvoiceQuery, MemoryStore};
use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

/// Input for creating an invoice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub invoice_type: InvoiceType,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Customer and invoice operations over a shared store.
///
/// The service is `Send + Sync`; share one instance behind an [`Arc`] and
/// call it from as many threads as needed. Operations against different
/// entities run concurrently, operations against the same entity are
/// serialized first-come-first-served.
pub struct InvoiceService {
    store: Arc<dyn EntityStore>,
    locks: LockManager,
    config: ConfigHandle,
    outbox: DispatchOutbox,
    /// Serializes email-uniqueness check-and-write across customers.
    email_lock: Mutex<()>,
}

impl InvoiceService {
    /// Service over a fresh in-memory store with default configuration.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), ConfigHandle::default())
    }

    /// Service over a caller-provided store and configuration.
    pub fn with_store(store: Arc<dyn EntityStore>, config: ConfigHandle) -> Self {
        Self {
            store,
            locks: LockManager::new(),
            config,
            outbox: DispatchOutbox::new(),
            email_lock: Mutex::new(()),
        }
    }

    /// The live configuration handle; updates affect the next computation.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Pending dispatch requests produced by [`InvoiceService::send_invoice`].
    pub fn outbox(&self) -> &DispatchOutbox {
        &self.outbox
    }

    /// The lease registry backing this service.
    ///
    /// Callers composing multi-entity work can take leases through it; the
    /// customer-before-invoice order must be kept.
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    fn lock_customer(&self, id: CustomerId) -> Result<Lease, BillingError> {
        let timeout = self.config.snapshot().lock_timeout;
        self.locks.acquire(EntityKind::Customer, id.0, timeout)
    }

    fn lock_invoice(&self, id: InvoiceId) -> Result<Lease, BillingError> {
        let timeout = self.config.snapshot().lock_timeout;
        self.locks.acquire(EntityKind::Invoice, id.0, timeout)
    }

    // === Customers ===

    /// Creates a customer after validating all fields and email uniqueness.
    pub fn create_customer(&self, input: NewCustomer) -> Result<Customer, BillingError> {
        let customer = Customer::new(input)?;
        let _lease = self.lock_customer(customer.id)?;

        let _email_guard = self.email_lock.lock();
        self.ensure_email_free(&customer.email, None)?;
        self.store.put_customer(customer.clone());

        tracing::info!(customer = %customer.id, name = %customer.name, "customer created");
        Ok(customer)
    }

    /// Applies a partial update to an existing customer.
    pub fn update_customer(
        &self,
        id: CustomerId,
        update: CustomerUpdate,
    ) -> Result<Customer, BillingError> {
        let _lease = self.lock_customer(id)?;
        let mut customer = self
            .store
            .get_customer(&id)
            .ok_or(BillingError::CustomerNotFound(id))?;

        customer.apply_update(update)?;

        let _email_guard = self.email_lock.lock();
        self.ensure_email_free(&customer.email, Some(id))?;
        self.store.put_customer(customer.clone());

        tracing::info!(customer = %id, "customer updated");
        Ok(customer)
    }

    /// Deletes a customer with no non-cancelled invoices.
    pub fn delete_customer(&self, id: CustomerId) -> Result<(), BillingError> {
        let _lease = self.lock_customer(id)?;
        if self.store.get_customer(&id).is_none() {
            return Err(BillingError::CustomerNotFound(id));
        }

        let blocked = self
            .store
            .list_invoices(&InvoiceQuery::by_customer(id))
            .iter()
            .any(|invoice| invoice.status != InvoiceStatus::Cancelled);
        if blocked {
            return Err(BillingError::HasActiveInvoices(id));
        }

        self.store.delete_customer(&id);
        tracing::info!(customer = %id, "customer deleted");
        Ok(())
    }

    pub fn get_customer(&self, id: CustomerId) -> Result<Customer, BillingError> {
        self.store
            .get_customer(&id)
            .ok_or(BillingError::CustomerNotFound(id))
    }

    /// All customers, creation order.
    pub fn list_customers(&self) -> Vec<Customer> {
        self.store.list_customers()
    }

    /// Customers whose name or email contains `query` (case-insensitive).
    pub fn find_customers(&self, query: &str) -> Vec<Customer> {
        self.store
            .list_customers()
            .into_iter()
            .filter(|customer| customer.matches_query(query))
            .collect()
    }

    fn ensure_email_free(
        &self,
        email: &str,
        exclude: Option<CustomerId>,
    ) -> Result<(), BillingError> {
        let taken = self
            .store
            .list_customers()
            .iter()
            .any(|existing| {
                Some(existing.id) != exclude && existing.email.eq_ignore_ascii_case(email)
            });
        if taken {
            return Err(BillingError::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }

    // === Invoices ===

    /// Creates a draft invoice for an existing customer and assigns the next
    /// serial number for its type.
    pub fn create_invoice(
        &self,
        customer_id: CustomerId,
        input: NewInvoice,
    ) -> Result<Invoice, BillingError> {
        let config = self.config.snapshot();

        // Customer lease first: it guards against deletion racing creation
        // and fixes the cross-entity lock order.
        let _customer_lease = self.lock_customer(customer_id)?;
        if self.store.get_customer(&customer_id).is_none() {
            return Err(BillingError::CustomerNotFound(customer_id));
        }

        let number = self.next_invoice_number(input.invoice_type, &config);
        let invoice = Invoice::new(
            customer_id,
            number,
            input.invoice_type,
            input.due_date,
            input.notes,
            &config,
        )?;
        let _invoice_lease = self.lock_invoice(invoice.id)?;
        self.store.put_invoice(invoice.clone());

        tracing::info!(invoice = %invoice.id, number = %invoice.number, "invoice created");
        Ok(invoice)
    }

    fn next_invoice_number(
        &self,
        invoice_type: InvoiceType,
        config: &crate::config::BillingConfig,
    ) -> String {
        let prefix = match invoice_type {
            InvoiceType::CreditNote => &config.credit_note_prefix,
            InvoiceType::Standard | InvoiceType::TaxInvoice => &config.invoice_prefix,
        };
        let year = Utc::now().year();
        let sequence = self.store.next_serial(&format!("{prefix}-{year}"));
        format!("{prefix}-{year}-{sequence:06}")
    }

    /// Appends a line item to a draft invoice and returns the updated record.
    pub fn add_invoice_item(
        &self,
        invoice_id: InvoiceId,
        description: &str,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<Invoice, BillingError> {
        let config = self.config.snapshot();
        let _lease = self.lock_invoice(invoice_id)?;
        let mut invoice = self
            .store
            .get_invoice(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let item = LineItem::new(description, quantity, unit_price)?;
        invoice.add_item(item, &config)?;
        self.store.put_invoice(invoice.clone());

        tracing::info!(invoice = %invoice_id, subtotal = %invoice.subtotal, "line item added");
        Ok(invoice)
    }

    /// Removes a line item from a draft invoice.
    pub fn remove_invoice_item(
        &self,
        invoice_id: InvoiceId,
        item_id: LineItemId,
    ) -> Result<Invoice, BillingError> {
        let config = self.config.snapshot();
        let _lease = self.lock_invoice(invoice_id)?;
        let mut invoice = self
            .store
            .get_invoice(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        invoice.remove_item(item_id, &config)?;
        self.store.put_invoice(invoice.clone());

        tracing::info!(invoice = %invoice_id, item = %item_id, "line item removed");
        Ok(invoice)
    }

    /// Moves an invoice to `target` per the transition table.
    pub fn update_invoice_status(
        &self,
        invoice_id: InvoiceId,
        target: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        let _lease = self.lock_invoice(invoice_id)?;
        let mut invoice = self
            .store
            .get_invoice(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let previous = invoice.status;
        invoice.change_status(target)?;
        self.store.put_invoice(invoice.clone());

        tracing::info!(invoice = %invoice_id, from = %previous, to = %target, "status changed");
        Ok(invoice)
    }

    /// Records a payment and advances the status in the same lock-protected
    /// step.
    pub fn record_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
        method: Option<&str>,
    ) -> Result<Invoice, BillingError> {
        let _lease = self.lock_invoice(invoice_id)?;
        let mut invoice = self
            .store
            .get_invoice(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        invoice.apply_payment(amount, method.map(str::to_string))?;
        self.store.put_invoice(invoice.clone());

        tracing::info!(
            invoice = %invoice_id,
            amount = %amount,
            paid = %invoice.amount_paid,
            status = %invoice.status,
            "payment recorded"
        );
        Ok(invoice)
    }

    /// Marks an invoice as sent and queues it for dispatch.
    ///
    /// A draft is issued first (which requires at least one line item). The
    /// transition commits before the dispatch request is enqueued, so a
    /// failing or retried dispatch never affects the invoice state.
    pub fn send_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        let _lease = self.lock_invoice(invoice_id)?;
        let mut invoice = self
            .store
            .get_invoice(&invoice_id)
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;

        let recipient = self
            .store
            .get_customer(&invoice.customer_id)
            .ok_or(BillingError::CustomerNotFound(invoice.customer_id))?
            .email;

        if invoice.status == InvoiceStatus::Draft {
            invoice.change_status(InvoiceStatus::Issued)?;
        }
        invoice.change_status(InvoiceStatus::Sent)?;
        self.store.put_invoice(invoice.clone());

        self.outbox.push(DispatchRequest {
            invoice_id,
            invoice_number: invoice.number.clone(),
            recipient,
        });
        tracing::info!(invoice = %invoice_id, number = %invoice.number, "invoice sent");
        Ok(invoice)
    }

    pub fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.store
            .get_invoice(&id)
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    /// Invoices matching an arbitrary query.
    pub fn list_invoices(&self, query: &InvoiceQuery) -> Vec<Invoice> {
        self.store.list_invoices(query)
    }

    /// All invoices for one customer, creation order.
    pub fn invoices_for_customer(&self, customer_id: CustomerId) -> Vec<Invoice> {
        self.store
            .list_invoices(&InvoiceQuery::by_customer(customer_id))
    }

    /// Outstanding invoices due strictly before `today`, most overdue first.
    pub fn overdue_invoices(&self, today: NaiveDate) -> Vec<Invoice> {
        self.store.list_invoices(&InvoiceQuery::overdue(today))
    }

    /// The `limit` most recently created invoices, newest first.
    pub fn recent_invoices(&self, limit: usize) -> Vec<Invoice> {
        let mut invoices = self.store.list_invoices(&InvoiceQuery::recent());
        invoices.truncate(limit);
        invoices
    }

    /// Aggregate figures over the whole store.
    pub fn statistics(&self) -> Statistics {
        let invoices = self.store.list_invoices(&InvoiceQuery::all());
        Statistics::compute(self.store.list_customers().len(), &invoices)
    }
}

impl Default for InvoiceService {
    fn default() -> Self {
        Self::new()
    }
}
