use crate::error::SeedResult;
use crate::types::*;

/// Max tokens spent on an availability probe
pub const PROBE_MAX_TOKENS: usize = 32;

/// Core provider trait: one completion call against a backend
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Get provider kind
    fn kind(&self) -> ProviderKind;

    /// One non-streaming completion
    async fn invoke(&self, request: &CompletionRequest) -> SeedResult<CompletionResponse>;

    /// Cheap availability check: a model is usable when a short ping yields content.
    async fn probe(&self, model: &str) -> SeedResult<bool> {
        let request = CompletionRequest::new(model, vec![Message::user("ping")], PROBE_MAX_TOKENS);
        let response = self.invoke(&request).await?;
        Ok(!response.content.is_empty())
    }
}

/// Map a non-success HTTP status to the matching error.
pub(crate) fn status_error(provider: &ProviderKind, status: u16, body: &str) -> crate::error::SeedError {
    use crate::error::SeedError;
    match status {
        429 => SeedError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms: 60_000,
        },
        401 | 403 => SeedError::Auth(format!("{provider} rejected credentials: {body}")),
        _ => SeedError::Provider(format!("{provider} HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeedError;

    struct Echo;

    #[async_trait::async_trait]
    impl Provider for Echo {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("echo".into())
        }

        async fn invoke(&self, request: &CompletionRequest) -> SeedResult<CompletionResponse> {
            if request.model == "dead" {
                return Ok(CompletionResponse::new(vec![], StopReason::EndTurn));
            }
            assert_eq!(request.max_tokens, PROBE_MAX_TOKENS);
            Ok(CompletionResponse::text("pong"))
        }
    }

    // Trait object safety check
    #[test]
    fn provider_is_object_safe() {
        fn _assert_object_safe(_: &dyn Provider) {}
    }

    #[tokio::test]
    async fn probe_requires_content() {
        assert!(Echo.probe("alive").await.unwrap());
        assert!(!Echo.probe("dead").await.unwrap());
    }

    #[test]
    fn status_mapping() {
        let kind = ProviderKind::Anthropic;
        assert!(matches!(status_error(&kind, 429, ""), SeedError::RateLimited { .. }));
        assert!(matches!(status_error(&kind, 401, ""), SeedError::Auth(_)));
        assert!(matches!(status_error(&kind, 403, ""), SeedError::Auth(_)));
        assert!(matches!(status_error(&kind, 500, "boom"), SeedError::Provider(m) if m.contains("boom")));
    }
}
