// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse, ProviderError};

/// A chat-completion provider.
///
/// Implementations hold only transport state (endpoint, credentials, pooled
/// HTTP client) and are shared across turns; the model, transcript, tools
/// and sampling parameters all travel in the request.  Cancellation is
/// cooperative: dropping the `invoke` future aborts the in-flight call.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id, e.g. `"openai"`.
    fn provider_type(&self) -> &str;

    /// Perform one chat completion.
    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}
