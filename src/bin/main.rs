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

use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use invoice_engine_rs::{
    BillingConfig, ConfigHandle, CustomerId, InvoiceId, InvoiceService, InvoiceStatus, NewCustomer,
    NewInvoice,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Invoice Importer - Load customers and invoices from CSV files
///
/// Reads billable line items from a CSV file, builds the matching customers
/// and draft invoices, and writes an invoice summary to stdout.
#[derive(Parser, Debug)]
#[command(name = "invoice-engine-rs")]
#[command(about = "Bulk-imports customers and invoices from a line-item CSV", long_about = None)]
struct Args {
    /// Path to CSV file with line items
    ///
    /// Expected format: customer,email,invoice,description,quantity,unit_price,due_date,notes
    /// Rows sharing an `invoice` key land on the same invoice; customers are
    /// de-duplicated by email.
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Issue every imported invoice after loading
    #[arg(long)]
    issue: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let service = InvoiceService::with_store(
        std::sync::Arc::new(invoice_engine_rs::MemoryStore::new()),
        ConfigHandle::new(BillingConfig::from_env()),
    );

    let imported = match import_invoices(&service, BufReader::new(file)) {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("Error importing invoices: {}", e);
            process::exit(1);
        }
    };

    if args.issue {
        issue_all(&service, &imported);
    }

    if let Err(e) = write_summary(&service, &imported, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `customer, email, invoice, description, quantity, unit_price,
/// due_date, notes`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    customer: String,
    email: String,
    invoice: String,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    notes: Option<String>,
}

/// Imports line items from a CSV reader into the service.
///
/// Streams the file row by row: the first row naming a customer email creates
/// the customer, the first row naming an invoice key creates a draft invoice,
/// and every row appends one line item. Malformed rows and rows the service
/// rejects are skipped rather than aborting the batch; skips are logged in
/// debug builds.
///
/// Returns the imported invoice ids in file order.
///
/// # Errors
///
/// Returns a CSV error if the reader itself fails or the CSV structure is
/// invalid.
pub fn import_invoices<R: Read>(
    service: &InvoiceService,
    reader: R,
) -> Result<Vec<InvoiceId>, csv::Error> {
    let payment_terms = service.config().snapshot().payment_terms_days;
    let default_due = Utc::now().date_naive() + Duration::days(payment_terms);

    let mut customers: HashMap<String, CustomerId> = HashMap::new();
    let mut invoices: HashMap<String, InvoiceId> = HashMap::new();
    let mut imported: Vec<InvoiceId> = Vec::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow missing trailing due_date/notes fields
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                #[cfg(not(debug_assertions))]
                let _ = e;
                continue;
            }
        };

        let email_key = record.email.to_lowercase();
        let customer_id = match customers.get(&email_key) {
            Some(id) => *id,
            None => {
                let created = service.create_customer(NewCustomer {
                    name: record.customer.clone(),
                    email: record.email.clone(),
                    ..Default::default()
                });
                match created {
                    Ok(customer) => {
                        customers.insert(email_key, customer.id);
                        customer.id
                    }
                    Err(e) => {
                        #[cfg(debug_assertions)]
                        eprintln!("Skipping row for customer '{}': {}", record.customer, e);
                        #[cfg(not(debug_assertions))]
                        let _ = e;
                        continue;
                    }
                }
            }
        };

        let invoice_id = match invoices.get(&record.invoice) {
            Some(id) => *id,
            None => {
                let created = service.create_invoice(
                    customer_id,
                    NewInvoice {
                        due_date: Some(record.due_date.unwrap_or(default_due)),
                        notes: record.notes.clone(),
                        ..Default::default()
                    },
                );
                match created {
                    Ok(invoice) => {
                        invoices.insert(record.invoice.clone(), invoice.id);
                        imported.push(invoice.id);
                        invoice.id
                    }
                    Err(e) => {
                        #[cfg(debug_assertions)]
                        eprintln!("Skipping invoice '{}': {}", record.invoice, e);
                        #[cfg(not(debug_assertions))]
                        let _ = e;
                        continue;
                    }
                }
            }
        };

        if let Err(e) = service.add_invoice_item(
            invoice_id,
            &record.description,
            record.quantity,
            record.unit_price,
        ) {
            #[cfg(debug_assertions)]
            eprintln!("Skipping item '{}': {}", record.description, e);
            #[cfg(not(debug_assertions))]
            let _ = e;
        }
    }

    Ok(imported)
}

/// Issues every imported invoice that qualifies (drafts with items).
pub fn issue_all(service: &InvoiceService, invoice_ids: &[InvoiceId]) {
    for &invoice_id in invoice_ids {
        if let Err(e) = service.update_invoice_status(invoice_id, InvoiceStatus::Issued) {
            #[cfg(debug_assertions)]
            eprintln!("Could not issue invoice {}: {}", invoice_id, e);
            #[cfg(not(debug_assertions))]
            let _ = e;
        }
    }
}

/// Invoice summary row written to stdout.
///
/// Columns: `number, customer, status, subtotal, tax, total, due_date`
#[derive(Debug, Serialize)]
struct SummaryRow {
    number: String,
    customer: String,
    status: String,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    due_date: Option<NaiveDate>,
}

/// Writes one summary row per imported invoice, in file order.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_summary<W: Write>(
    service: &InvoiceService,
    invoice_ids: &[InvoiceId],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for &invoice_id in invoice_ids {
        let Ok(invoice) = service.get_invoice(invoice_id) else {
            continue;
        };
        let customer = service
            .get_customer(invoice.customer_id)
            .map(|c| c.name)
            .unwrap_or_default();
        wtr.serialize(SummaryRow {
            number: invoice.number.clone(),
            customer,
            status: invoice.status.to_string(),
            subtotal: invoice.subtotal,
            tax: invoice.tax_amount,
            total: invoice.total,
            due_date: invoice.due_date,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
