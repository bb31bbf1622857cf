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

//! Outbox for invoice dispatch.
//!
//! Sending an invoice commits the status transition first and then enqueues a
//! request here. An external sender drains the queue and may retry; a failed
//! dispatch can never undo the committed transition.

use crate::base::InvoiceId;
use crossbeam::queue::SegQueue;
use serde::Serialize;

/// One pending dispatch to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub recipient: String,
}

/// Lock-free FIFO queue of pending dispatches.
#[derive(Debug, Default)]
pub struct DispatchOutbox {
    queue: SegQueue<DispatchRequest>,
}

impl DispatchOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: DispatchRequest) {
        self.queue.push(request);
    }

    /// Removes and returns the oldest pending dispatch, if any.
    pub fn pop(&self) -> Option<DispatchRequest> {
        self.queue.pop()
    }

    /// Removes and returns everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<DispatchRequest> {
        let mut requests = Vec::with_capacity(self.queue.len());
        while let Some(request) = self.queue.pop() {
            requests.push(request);
        }
        requests
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
