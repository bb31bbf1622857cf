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

//! Key-addressed persistence for customer and invoice records.
//!
//! The store holds whole records and swaps them atomically on `put`; readers
//! observe either the previous or the new record, never a partial write.
//! Serializing conflicting mutations is the lock manager's job, not the
//! store's, so no cross-record transactions exist here.

use crate::base::{CustomerId, InvoiceId};
use crate::customer::Customer;
use crate::invoice::{Invoice, InvoiceStatus};
use chrono::NaiveDate;
use dashmap::DashMap;

/// Sort order for invoice listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvoiceOrder {
    /// Creation time ascending (the default).
    #[default]
    CreatedAsc,
    /// Creation time descending ("recent first").
    CreatedDesc,
    /// Due date ascending (most overdue first).
    DueAsc,
}

/// Attribute filter for invoice listings.
///
/// All set fields must match. `due_before` additionally restricts the result
/// to invoices that still have money outstanding, which makes
/// [`InvoiceQuery::overdue`] a plain list query rather than a special index.
#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<CustomerId>,
    pub due_before: Option<NaiveDate>,
    pub order: InvoiceOrder,
}

impl InvoiceQuery {
    /// Everything, creation order.
    pub fn all() -> Self {
        Self::default()
    }

    /// All invoices owned by one customer.
    pub fn by_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Self::default()
        }
    }

    /// All invoices with one status.
    pub fn by_status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Outstanding invoices due strictly before `today`, most overdue first.
    pub fn overdue(today: NaiveDate) -> Self {
        Self {
            due_before: Some(today),
            order: InvoiceOrder::DueAsc,
            ..Self::default()
        }
    }

    /// Everything, newest first.
    pub fn recent() -> Self {
        Self {
            order: InvoiceOrder::CreatedDesc,
            ..Self::default()
        }
    }

    fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(status) = self.status {
            if invoice.status != status {
                return false;
            }
        }
        if let Some(customer_id) = self.customer_id {
            if invoice.customer_id != customer_id {
                return false;
            }
        }
        if let Some(cutoff) = self.due_before {
            if !invoice.status.outstanding() {
                return false;
            }
            match invoice.due_date {
                Some(due) if due < cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

/// Storage contract for the billing core.
///
/// Implementations must make every `put` atomic for the single record and be
/// safe to call from concurrent threads. The in-crate reference
/// implementation is [`MemoryStore`]; the service is agnostic to whether the
/// records actually live in memory, on disk, or behind a network.
pub trait EntityStore: Send + Sync {
    fn get_customer(&self, id: &CustomerId) -> Option<Customer>;
    /// Upsert; overwrites the whole record.
    fn put_customer(&self, customer: Customer);
    fn delete_customer(&self, id: &CustomerId) -> bool;
    /// All customers, creation time ascending.
    fn list_customers(&self) -> Vec<Customer>;

    fn get_invoice(&self, id: &InvoiceId) -> Option<Invoice>;
    /// Upsert; overwrites the whole record.
    fn put_invoice(&self, invoice: Invoice);
    fn delete_invoice(&self, id: &InvoiceId) -> bool;
    fn list_invoices(&self, query: &InvoiceQuery) -> Vec<Invoice>;

    /// Atomically increments and returns the serial counter for `key`
    /// (e.g. `"INV-2026"`). Counters start at 1.
    fn next_serial(&self, key: &str) -> u64;
}

/// In-memory [`EntityStore`] backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    customers: DashMap<CustomerId, Customer>,
    invoices: DashMap<InvoiceId, Invoice>,
    serials: DashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn get_customer(&self, id: &CustomerId) -> Option<Customer> {
        self.customers.get(id).map(|entry| entry.value().clone())
    }

    fn put_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    fn delete_customer(&self, id: &CustomerId) -> bool {
        self.customers.remove(id).is_some()
    }

    fn list_customers(&self) -> Vec<Customer> {
        let mut customers: Vec<Customer> = self
            .customers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        customers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        customers
    }

    fn get_invoice(&self, id: &InvoiceId) -> Option<Invoice> {
        self.invoices.get(id).map(|entry| entry.value().clone())
    }

    fn put_invoice(&self, invoice: Invoice) {
        self.invoices.insert(invoice.id, invoice);
    }

    fn delete_invoice(&self, id: &InvoiceId) -> bool {
        self.invoices.remove(id).is_some()
    }

    fn list_invoices(&self, query: &InvoiceQuery) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        match query.order {
            InvoiceOrder::CreatedAsc => {
                invoices.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            }
            InvoiceOrder::CreatedDesc => {
                invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            }
            InvoiceOrder::DueAsc => {
                invoices.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
            }
        }
        invoices
    }

    fn next_serial(&self, key: &str) -> u64 {
        // Entry access is atomic per key, so two concurrent callers never
        // observe the same counter value.
        *self
            .serials
            .entry(key.to_string())
            .and_modify(|counter| *counter += 1)
            .or_insert(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingConfig;
    use crate::customer::NewCustomer;
    use crate::invoice::{InvoiceType, LineItem};
    use rust_decimal_macros::dec;

    fn customer(name: &str, email: &str) -> Customer {
        Customer::new(NewCustomer {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn invoice_for(customer_id: CustomerId, number: &str) -> Invoice {
        Invoice::new(
            customer_id,
            number.into(),
            InvoiceType::TaxInvoice,
            None,
            None,
            &BillingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        let customer = customer("Acme", "a@acme.test");
        let id = customer.id;

        store.put_customer(customer);
        assert!(store.get_customer(&id).is_some());
        assert!(store.delete_customer(&id));
        assert!(store.get_customer(&id).is_none());
        assert!(!store.delete_customer(&id));
    }

    #[test]
    fn invoice_delete_roundtrip() {
        let store = MemoryStore::new();
        let owner = customer("Acme", "a@acme.test");
        let invoice = invoice_for(owner.id, "INV-1");
        let id = invoice.id;

        store.put_invoice(invoice);
        assert!(store.get_invoice(&id).is_some());
        assert!(store.delete_invoice(&id));
        assert!(store.get_invoice(&id).is_none());
        assert!(!store.delete_invoice(&id));
    }

    #[test]
    fn put_overwrites_whole_record() {
        let store = MemoryStore::new();
        let mut customer = customer("Acme", "a@acme.test");
        let id = customer.id;
        store.put_customer(customer.clone());

        customer.name = "Acme Global".into();
        store.put_customer(customer);
        assert_eq!(store.get_customer(&id).unwrap().name, "Acme Global");
    }

    #[test]
    fn list_invoices_filters_by_customer_and_status() {
        let store = MemoryStore::new();
        let alice = customer("Alice", "alice@test.test");
        let bob = customer("Bob", "bob@test.test");

        let mut a1 = invoice_for(alice.id, "INV-1");
        a1.change_status(InvoiceStatus::Cancelled).unwrap();
        let a2 = invoice_for(alice.id, "INV-2");
        let b1 = invoice_for(bob.id, "INV-3");
        store.put_invoice(a1);
        store.put_invoice(a2.clone());
        store.put_invoice(b1);

        let alices = store.list_invoices(&InvoiceQuery::by_customer(alice.id));
        assert_eq!(alices.len(), 2);

        let drafts = store.list_invoices(&InvoiceQuery::by_status(InvoiceStatus::Draft));
        assert_eq!(drafts.len(), 2);

        let mut query = InvoiceQuery::by_customer(alice.id);
        query.status = Some(InvoiceStatus::Draft);
        let filtered = store.list_invoices(&query);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a2.id);
    }

    #[test]
    fn overdue_query_skips_paid_and_undue() {
        let config = BillingConfig::default();
        let store = MemoryStore::new();
        let owner = customer("Acme", "a@acme.test");
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();

        // outstanding and past due
        let mut late = invoice_for(owner.id, "INV-1");
        late.due_date = today.pred_opt();
        late.add_item(LineItem::new("x", dec!(1), dec!(10)).unwrap(), &config)
            .unwrap();
        late.change_status(InvoiceStatus::Issued).unwrap();

        // past due but still a draft
        let mut draft = invoice_for(owner.id, "INV-2");
        draft.due_date = today.pred_opt();

        // outstanding but due tomorrow
        let mut early = invoice_for(owner.id, "INV-3");
        early.due_date = today.succ_opt();
        early
            .add_item(LineItem::new("x", dec!(1), dec!(10)).unwrap(), &config)
            .unwrap();
        early.change_status(InvoiceStatus::Issued).unwrap();

        let late_id = late.id;
        store.put_invoice(late);
        store.put_invoice(draft);
        store.put_invoice(early);

        let overdue = store.list_invoices(&InvoiceQuery::overdue(today));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, late_id);
    }

    #[test]
    fn recent_orders_newest_first() {
        let store = MemoryStore::new();
        let owner = customer("Acme", "a@acme.test");

        let first = invoice_for(owner.id, "INV-1");
        let mut second = invoice_for(owner.id, "INV-2");
        // force distinct timestamps regardless of clock resolution
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let (first_id, second_id) = (first.id, second.id);
        store.put_invoice(first);
        store.put_invoice(second);

        let recent = store.list_invoices(&InvoiceQuery::recent());
        assert_eq!(recent[0].id, second_id);
        assert_eq!(recent[1].id, first_id);
    }

    #[test]
    fn serial_counters_are_per_key() {
        let store = MemoryStore::new();
        assert_eq!(store.next_serial("INV-2026"), 1);
        assert_eq!(store.next_serial("INV-2026"), 2);
        assert_eq!(store.next_serial("CRN-2026"), 1);
        assert_eq!(store.next_serial("INV-2027"), 1);
    }
}
