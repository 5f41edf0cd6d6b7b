// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("pending approval {0} not found")]
    NotFound(String),
    #[error("pending approval {0} already resolved")]
    AlreadyResolved(String),
}
