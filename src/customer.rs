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

//! Customer records and field validation.

use crate::base::CustomerId;
use crate::error::BillingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NAME: usize = 200;
const MAX_EMAIL: usize = 254;
const MAX_PHONE: usize = 20;
const MAX_ADDRESS: usize = 500;
const MAX_TAX_ID: usize = 50;

/// A client of the business.
///
/// A customer with at least one non-cancelled invoice cannot be deleted;
/// the service enforces that referential rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

/// Partial customer update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl Customer {
    /// Validates the input and builds a fresh customer record.
    pub fn new(input: NewCustomer) -> Result<Self, BillingError> {
        validate_name(&input.name)?;
        validate_email(&input.email)?;
        if let Some(phone) = &input.phone {
            validate_phone(phone)?;
        }
        if let Some(address) = &input.address {
            validate_len("address", address, MAX_ADDRESS)?;
        }
        if let Some(tax_id) = &input.tax_id {
            validate_len("tax id", tax_id, MAX_TAX_ID)?;
        }

        let now = Utc::now();
        Ok(Self {
            id: CustomerId::new(),
            name: input.name,
            email: input.email,
            address: input.address,
            phone: input.phone,
            tax_id: input.tax_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a partial update, validating every changed field.
    pub fn apply_update(&mut self, update: CustomerUpdate) -> Result<(), BillingError> {
        if let Some(name) = update.name {
            validate_name(&name)?;
            self.name = name;
        }
        if let Some(email) = update.email {
            validate_email(&email)?;
            self.email = email;
        }
        if let Some(phone) = update.phone {
            validate_phone(&phone)?;
            self.phone = Some(phone);
        }
        if let Some(address) = update.address {
            validate_len("address", &address, MAX_ADDRESS)?;
            self.address = Some(address);
        }
        if let Some(tax_id) = update.tax_id {
            validate_len("tax id", &tax_id, MAX_TAX_ID)?;
            self.tax_id = Some(tax_id);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Case-insensitive substring match over name and email.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query) || self.email.to_lowercase().contains(&query)
    }
}

fn validate_name(name: &str) -> Result<(), BillingError> {
    if name.trim().is_empty() {
        return Err(BillingError::Validation("name must not be empty".into()));
    }
    validate_len("name", name, MAX_NAME)
}

fn validate_email(email: &str) -> Result<(), BillingError> {
    // Shape check only: non-empty local and domain parts around one '@'.
    let valid = email.len() <= MAX_EMAIL
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(BillingError::Validation(format!(
            "invalid email address: {email}"
        )))
    }
}

fn validate_phone(phone: &str) -> Result<(), BillingError> {
    validate_len("phone", phone, MAX_PHONE)?;
    let cleaned = phone.replace([' ', '-', '+'], "");
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(BillingError::Validation(
            "phone may contain only digits, spaces, dashes, and +".into(),
        ));
    }
    Ok(())
}

fn validate_len(field: &str, value: &str, max: usize) -> Result<(), BillingError> {
    if value.len() > max {
        return Err(BillingError::Validation(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}
