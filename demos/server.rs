//! Simple REST API server example for the invoice engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /customers` - Create a customer
//! - `GET /customers` - List all customers
//! - `GET /customers/{id}` - Get a customer by id
//! - `PATCH /customers/{id}` - Update customer fields
//! - `DELETE /customers/{id}` - Delete a customer without active invoices
//! - `POST /invoices` - Create a draft invoice
//! - `GET /invoices` - List all invoices
//! - `GET /invoices/{id}` - Get an invoice by id
//! - `POST /invoices/{id}/items` - Add a line item to a draft
//! - `POST /invoices/{id}/payments` - Record a payment
//! - `POST /invoices/{id}/status` - Change the invoice status
//! - `POST /invoices/{id}/send` - Issue (if needed) and send an invoice
//! - `GET /statistics` - Aggregate figures
//!
//! ## Example Usage
//!
//! ```bash
//! # Create a customer
//! curl -X POST http://localhost:3000/customers \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Acme Ltd", "email": "billing@acme.test"}'
//!
//! # Create an invoice
//! curl -X POST http://localhost:3000/invoices \
//!   -H "Content-Type: application/json" \
//!   -d '{"customer_id": "<uuid>"}'
//!
//! # Add an item (amounts are decimal strings)
//! curl -X POST http://localhost:3000/invoices/<uuid>/items \
//!   -H "Content-Type: application/json" \
//!   -d '{"description": "Widget", "quantity": "2", "unit_price": "10.00"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use invoice_engine_rs::{
    BillingError, Customer, CustomerId, CustomerUpdate, Invoice, InvoiceId, InvoiceService,
    InvoiceStatus, LineItemId, NewCustomer, NewInvoice, Statistics,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// === Request DTOs ===

/// Request body for creating invoices.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    #[serde(flatten)]
    pub invoice: NewInvoice,
}

/// Request body for adding a line item.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Request body for recording a payment.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub method: Option<String>,
}

/// Request body for a status change.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: InvoiceStatus,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the billing service.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InvoiceService>,
}

// === Error Handling ===

/// Wrapper for converting `BillingError` into HTTP responses.
pub struct AppError(BillingError);

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BillingError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            BillingError::CustomerNotFound(_) => (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND"),
            BillingError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, "INVOICE_NOT_FOUND"),
            BillingError::LineItemNotFound(_) => (StatusCode::NOT_FOUND, "LINE_ITEM_NOT_FOUND"),
            BillingError::DuplicateEmail(_) => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
            BillingError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            BillingError::NotEditable(_) => (StatusCode::CONFLICT, "NOT_EDITABLE"),
            BillingError::NotPayable(_) => (StatusCode::CONFLICT, "NOT_PAYABLE"),
            BillingError::Overpayment { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "OVERPAYMENT"),
            BillingError::HasActiveInvoices(_) => (StatusCode::CONFLICT, "HAS_ACTIVE_INVOICES"),
            BillingError::LockTimeout(_) => (StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Customer Handlers ===

/// POST /customers - Create a new customer.
async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let customer = state.service.create_customer(request)?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /customers - List all customers.
async fn list_customers(State(state): State<AppState>) -> Json<Vec<Customer>> {
    Json(state.service.list_customers())
}

/// GET /customers/{id} - Get customer by id.
async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.service.get_customer(CustomerId(id))?))
}

/// PATCH /customers/{id} - Update customer fields.
async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CustomerUpdate>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.service.update_customer(CustomerId(id), request)?))
}

/// DELETE /customers/{id} - Delete a customer.
async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_customer(CustomerId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// === Invoice Handlers ===

/// POST /invoices - Create a new draft invoice.
async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state
        .service
        .create_invoice(CustomerId(request.customer_id), request.invoice)?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices - List all invoices.
async fn list_invoices(State(state): State<AppState>) -> Json<Vec<Invoice>> {
    Json(
        state
            .service
            .list_invoices(&invoice_engine_rs::InvoiceQuery::all()),
    )
}

/// GET /invoices/{id} - Get invoice by id.
async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.service.get_invoice(InvoiceId(id))?))
}

/// GET /invoices/overdue - Outstanding invoices past their due date.
async fn overdue_invoices(State(state): State<AppState>) -> Json<Vec<Invoice>> {
    Json(state.service.overdue_invoices(Utc::now().date_naive()))
}

/// POST /invoices/{id}/items - Add a line item.
async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.service.add_invoice_item(
        InvoiceId(id),
        &request.description,
        request.quantity,
        request.unit_price,
    )?;
    Ok(Json(invoice))
}

/// DELETE /invoices/{id}/items/{item_id} - Remove a line item from a draft.
async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .service
        .remove_invoice_item(InvoiceId(id), LineItemId(item_id))?;
    Ok(Json(invoice))
}

/// POST /invoices/{id}/payments - Record a payment.
async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice =
        state
            .service
            .record_payment(InvoiceId(id), request.amount, request.method.as_deref())?;
    Ok(Json(invoice))
}

/// POST /invoices/{id}/status - Change the invoice status.
async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .service
        .update_invoice_status(InvoiceId(id), request.status)?;
    Ok(Json(invoice))
}

/// POST /invoices/{id}/send - Issue (if needed) and send an invoice.
async fn send_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.service.send_invoice(InvoiceId(id))?))
}

/// GET /statistics - Aggregate figures.
async fn statistics(State(state): State<AppState>) -> Json<Statistics> {
    Json(state.service.statistics())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/customers", post(create_customer).get(list_customers))
        .route(
            "/customers/{id}",
            get(get_customer)
                .patch(update_customer)
                .delete(delete_customer),
        )
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/overdue", get(overdue_invoices))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/items", post(add_item))
        .route("/invoices/{id}/items/{item_id}", axum::routing::delete(remove_item))
        .route("/invoices/{id}/payments", post(record_payment))
        .route("/invoices/{id}/status", post(change_status))
        .route("/invoices/{id}/send", post(send_invoice))
        .route("/statistics", get(statistics))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    let state = AppState {
        service: Arc::new(InvoiceService::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Invoice API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST   /customers                 - Create a customer");
    println!("  GET    /customers                 - List customers");
    println!("  POST   /invoices                  - Create a draft invoice");
    println!("  POST   /invoices/:id/items        - Add a line item");
    println!("  POST   /invoices/:id/payments     - Record a payment");
    println!("  POST   /invoices/:id/send         - Send an invoice");
    println!("  GET    /statistics                - Aggregate figures");

    axum::serve(listener, app).await.unwrap();
}
