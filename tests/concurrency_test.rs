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

//! Concurrency tests for the billing service.
//!
//! These tests hammer the public API from many threads and verify the
//! serialization guarantees: totals never lose an update, at most one of two
//! conflicting payments wins, and leases always come back, including on
//! error paths. parking_lot's deadlock detector (enabled via the
//! `deadlock_detection` dev feature) runs in the background throughout.

use invoice_engine_rs::{
    BillingError, Customer, EntityKind, Invoice, InvoiceService, InvoiceStatus, InvoiceType,
    LockManager, NewCustomer, NewInvoice,
};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

// === Helpers ===

fn make_customer(service: &InvoiceService, email: &str) -> Customer {
    service
        .create_customer(NewCustomer {
            name: "Load Test".into(),
            email: email.into(),
            ..Default::default()
        })
        .unwrap()
}

fn draft_invoice(service: &InvoiceService, customer: &Customer) -> Invoice {
    service
        .create_invoice(
            customer.id,
            NewInvoice {
                invoice_type: InvoiceType::Standard,
                ..Default::default()
            },
        )
        .unwrap()
}

/// Non-VAT invoice with one item worth `total`, moved to `Sent`.
fn sent_invoice(service: &InvoiceService, customer: &Customer, total: Decimal) -> Invoice {
    let invoice = draft_invoice(service, customer);
    service
        .add_invoice_item(invoice.id, "Services", dec!(1), total)
        .unwrap();
    service
        .update_invoice_status(invoice.id, InvoiceStatus::Issued)
        .unwrap();
    service
        .update_invoice_status(invoice.id, InvoiceStatus::Sent)
        .unwrap()
}

// === Serializability ===

/// Concurrent `add_invoice_item` calls on one invoice never lose an update:
/// the final subtotal is exactly the sum of all accepted items.
#[test]
fn concurrent_item_adds_sum_exactly() {
    let detector = start_deadlock_detector();
    let service = Arc::new(InvoiceService::new());
    let customer = make_customer(&service, "items@load.test");
    let invoice = draft_invoice(&service, &customer);

    const NUM_THREADS: usize = 8;
    const ITEMS_PER_THREAD: usize = 25;

    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let invoice_id = invoice.id;
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ITEMS_PER_THREAD {
                    service
                        .add_invoice_item(
                            invoice_id,
                            &format!("item {t}/{i}"),
                            dec!(1),
                            dec!(1.00),
                        )
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    let final_invoice = service.get_invoice(invoice.id).unwrap();
    let expected = NUM_THREADS * ITEMS_PER_THREAD;
    assert_eq!(final_invoice.items.len(), expected);
    assert_eq!(
        final_invoice.subtotal,
        Decimal::from(expected as u64),
    );
    let summed: Decimal = final_invoice.items.iter().map(|i| i.line_total()).sum();
    assert_eq!(final_invoice.subtotal, summed);
}

/// Two concurrent payments of 60.00 on a 100.00 invoice: exactly one wins,
/// the other fails with an overpayment error. Never both.
#[test]
fn conflicting_payments_have_exactly_one_winner() {
    let detector = start_deadlock_detector();

    // run several rounds to give the race a chance to show up
    for round in 0..20 {
        let service = Arc::new(InvoiceService::new());
        let customer = make_customer(&service, &format!("pay{round}@load.test"));
        let invoice = sent_invoice(&service, &customer, dec!(100.00));

        let barrier = Arc::new(Barrier::new(2));
        let successes = Arc::new(AtomicU32::new(0));
        let overpayments = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                let successes = Arc::clone(&successes);
                let overpayments = Arc::clone(&overpayments);
                let invoice_id = invoice.id;
                thread::spawn(move || {
                    barrier.wait();
                    match service.record_payment(invoice_id, dec!(60.00), None) {
                        Ok(_) => successes.fetch_add(1, Ordering::SeqCst),
                        Err(BillingError::Overpayment { .. }) => {
                            overpayments.fetch_add(1, Ordering::SeqCst)
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(successes.load(Ordering::SeqCst), 1, "round {round}");
        assert_eq!(overpayments.load(Ordering::SeqCst), 1, "round {round}");

        let final_invoice = service.get_invoice(invoice.id).unwrap();
        assert_eq!(final_invoice.amount_paid, dec!(60.00));
        assert_eq!(final_invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(final_invoice.payments.len(), 1);
    }

    stop_deadlock_detector(detector);
}

/// Payments racing item-adds on different invoices, plus customer traffic;
/// everything completes and every invoice stays internally consistent.
#[test]
fn mixed_workload_stays_consistent() {
    let detector = start_deadlock_detector();
    let service = Arc::new(InvoiceService::new());

    const NUM_CUSTOMERS: usize = 4;
    const INVOICES_PER_CUSTOMER: usize = 5;

    let customers: Vec<Customer> = (0..NUM_CUSTOMERS)
        .map(|i| make_customer(&service, &format!("mixed{i}@load.test")))
        .collect();
    let invoices: Vec<Invoice> = customers
        .iter()
        .flat_map(|customer| {
            (0..INVOICES_PER_CUSTOMER).map(|_| sent_invoice(&service, customer, dec!(50.00)))
        })
        .collect();

    let handles: Vec<_> = invoices
        .iter()
        .map(|invoice| {
            let service = Arc::clone(&service);
            let invoice_id = invoice.id;
            thread::spawn(move || {
                for _ in 0..10 {
                    let _ = service.record_payment(invoice_id, dec!(5.00), None);
                    let _ = service.get_invoice(invoice_id);
                    let _ = service.statistics();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    for invoice in &invoices {
        let current = service.get_invoice(invoice.id).unwrap();
        assert_eq!(current.amount_paid, dec!(50.00));
        assert_eq!(current.status, InvoiceStatus::Paid);
        let paid: Decimal = current.payments.iter().map(|p| p.amount).sum();
        assert_eq!(paid, current.amount_paid);
    }
}

// === Lease behavior ===

/// A lease held on the service's own registry makes the next mutation time
/// out with the transient lock-timeout error instead of blocking forever.
#[test]
fn held_lease_surfaces_as_lock_timeout() {
    let service = InvoiceService::new();
    let customer = make_customer(&service, "timeout@load.test");
    let invoice = draft_invoice(&service, &customer);

    let mut config = service.config().snapshot();
    config.lock_timeout = Duration::from_millis(50);
    service.config().update(config);

    let lease = service
        .lock_manager()
        .acquire(EntityKind::Invoice, invoice.id.0, Duration::from_secs(1))
        .unwrap();

    let result = service.add_invoice_item(invoice.id, "blocked", dec!(1), dec!(1.00));
    assert!(matches!(result, Err(BillingError::LockTimeout(_))));

    // reads are lease-free and keep working
    assert!(service.get_invoice(invoice.id).is_ok());

    // releasing the lease unblocks the next mutation: no dangling leases
    drop(lease);
    service
        .add_invoice_item(invoice.id, "after", dec!(1), dec!(1.00))
        .unwrap();
}

/// Validation failures release the lease like successes do.
#[test]
fn leases_released_on_error_paths() {
    let service = InvoiceService::new();
    let customer = make_customer(&service, "errors@load.test");
    let invoice = sent_invoice(&service, &customer, dec!(10.00));

    // a run of failing operations...
    for _ in 0..10 {
        assert!(service
            .add_invoice_item(invoice.id, "late", dec!(1), dec!(1.00))
            .is_err());
        assert!(service.record_payment(invoice.id, dec!(-1), None).is_err());
        assert!(service
            .update_invoice_status(invoice.id, InvoiceStatus::Draft)
            .is_err());
    }

    // ...leaves the invoice unlocked and usable
    let paid = service.record_payment(invoice.id, dec!(10.00), None).unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
}

/// Direct lock-manager timeout: a second acquire on the same entity resolves
/// to an error within the bound instead of queueing forever.
#[test]
fn lock_manager_bounds_the_wait() {
    let manager = Arc::new(LockManager::new());
    let id = uuid::Uuid::new_v4();

    let _held = manager
        .acquire(EntityKind::Invoice, id, Duration::from_secs(5))
        .unwrap();

    let started = std::time::Instant::now();
    let result = manager.acquire(EntityKind::Invoice, id, Duration::from_millis(100));
    assert!(matches!(result, Err(BillingError::LockTimeout(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Heavy same-entity contention finishes with every operation applied once.
#[test]
fn high_contention_single_invoice() {
    let detector = start_deadlock_detector();
    let service = Arc::new(InvoiceService::new());
    let customer = make_customer(&service, "contention@load.test");
    let invoice = sent_invoice(&service, &customer, dec!(10000.00));

    const NUM_THREADS: usize = 50;
    const PAYMENTS_PER_THREAD: usize = 4;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let service = Arc::clone(&service);
            let invoice_id = invoice.id;
            thread::spawn(move || {
                for _ in 0..PAYMENTS_PER_THREAD {
                    service
                        .record_payment(invoice_id, dec!(1.00), None)
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    let final_invoice = service.get_invoice(invoice.id).unwrap();
    assert_eq!(final_invoice.amount_paid, dec!(200.00));
    assert_eq!(final_invoice.payments.len(), NUM_THREADS * PAYMENTS_PER_THREAD);
    assert_eq!(final_invoice.status, InvoiceStatus::PartiallyPaid);
}

/// Customer deletion racing invoice creation never leaves an invoice owned
/// by a missing customer.
#[test]
fn deletion_and_creation_race_is_safe() {
    let detector = start_deadlock_detector();

    for round in 0..20 {
        let service = Arc::new(InvoiceService::new());
        let customer = make_customer(&service, &format!("race{round}@load.test"));
        let barrier = Arc::new(Barrier::new(2));

        let creator = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let customer_id = customer.id;
            thread::spawn(move || {
                barrier.wait();
                service.create_invoice(customer_id, NewInvoice::default())
            })
        };
        let deleter = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let customer_id = customer.id;
            thread::spawn(move || {
                barrier.wait();
                service.delete_customer(customer_id)
            })
        };

        let created = creator.join().unwrap();
        let deleted = deleter.join().unwrap();

        match (created, deleted) {
            // deletion first: creation must have failed
            (Err(BillingError::CustomerNotFound(_)), Ok(())) => {
                assert!(service.list_customers().is_empty());
            }
            // creation first: deletion must have been blocked
            (Ok(invoice), Err(BillingError::HasActiveInvoices(_))) => {
                assert!(service.get_customer(invoice.customer_id).is_ok());
            }
            (created, deleted) => {
                panic!("inconsistent outcome: created={created:?} deleted={deleted:?}")
            }
        }
    }

    stop_deadlock_detector(detector);
}
