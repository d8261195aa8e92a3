#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
    use parlor::config::{OpenAiConfig, PLACEHOLDER_API_KEY};
    use parlor::llm::models::Message;
    use parlor::llm::openai::OpenAiProvider;
    use parlor::llm::{CompletionClient, LlmError};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

    #[derive(Default)]
    struct Captured {
        authorization: Option<String>,
        body: Option<Value>,
        hits: usize,
    }

    struct MockEndpoint {
        api_base: String,
        captured: Arc<Mutex<Captured>>,
    }

    impl MockEndpoint {
        fn hits(&self) -> usize {
            self.captured.lock().unwrap().hits
        }

        fn request_body(&self) -> Value {
            self.captured.lock().unwrap().body.clone().expect("no request received")
        }

        fn authorization(&self) -> Option<String> {
            self.captured.lock().unwrap().authorization.clone()
        }
    }

    // Serves a canned reply on /v1/chat/completions and records what it was sent
    fn mock_endpoint(status: u16, reply: Value) -> MockEndpoint {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let state = captured.clone();
        let reply = web::Data::new((StatusCode::from_u16(status).unwrap(), reply));

        let server = HttpServer::new(move || {
            let state = state.clone();
            App::new().app_data(reply.clone()).route(
                "/v1/chat/completions",
                web::post().to(
                    move |req: HttpRequest,
                          body: web::Json<Value>,
                          reply: web::Data<(StatusCode, Value)>| {
                        let state = state.clone();
                        async move {
                            let mut captured = state.lock().unwrap();
                            captured.hits += 1;
                            captured.authorization = req
                                .headers()
                                .get("Authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            captured.body = Some(body.into_inner());
                            HttpResponse::build(reply.0).json(&reply.1)
                        }
                    },
                ),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        MockEndpoint {
            api_base: format!("http://{}/v1", addr),
            captured,
        }
    }

    fn provider(api_base: &str, api_key: &str) -> OpenAiProvider {
        let config = OpenAiConfig {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            ..Default::default()
        };
        OpenAiProvider::new(config, SYSTEM_PROMPT.to_string())
    }

    fn success_body() -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo-0125",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hi there"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 21, "completion_tokens": 3, "total_tokens": 24}
        })
    }

    #[actix_web::test]
    async fn test_completion_request_shape() {
        let mock = mock_endpoint(200, success_body());
        let client = provider(&mock.api_base, "sk-test");

        let history = vec![
            Message::user("What is Rust?"),
            Message::assistant("A systems language."),
        ];
        let response = client.complete("Hello", &history).await.unwrap();

        assert_eq!(response.content, "Hi there");
        assert_eq!(response.model, "gpt-3.5-turbo-0125");
        let usage = response.usage.expect("usage missing");
        assert_eq!(usage.input_tokens, 21);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 24);

        assert_eq!(mock.authorization().as_deref(), Some("Bearer sk-test"));

        let body = mock.request_body();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 150);
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], json!({"role": "system", "content": SYSTEM_PROMPT}));
        assert_eq!(messages[1], json!({"role": "user", "content": "What is Rust?"}));
        assert_eq!(messages[2], json!({"role": "assistant", "content": "A systems language."}));
        assert_eq!(messages[3], json!({"role": "user", "content": "Hello"}));
    }

    #[actix_web::test]
    async fn test_status_classification() {
        let error = json!({"error": {"message": "nope", "type": "x"}});

        let mock = mock_endpoint(401, error.clone());
        let result = provider(&mock.api_base, "sk-test").complete("Hello", &[]).await;
        assert!(matches!(result, Err(LlmError::Unauthorized)));

        let mock = mock_endpoint(429, error.clone());
        let result = provider(&mock.api_base, "sk-test").complete("Hello", &[]).await;
        assert!(matches!(result, Err(LlmError::RateLimited)));

        let mock = mock_endpoint(503, error);
        let result = provider(&mock.api_base, "sk-test").complete("Hello", &[]).await;
        assert!(matches!(result, Err(LlmError::ServerError(503))));
    }

    #[actix_web::test]
    async fn test_api_error_carries_message() {
        let mock = mock_endpoint(
            400,
            json!({"error": {"message": "This model's maximum context length is 4097 tokens."}}),
        );
        let result = provider(&mock.api_base, "sk-test").complete("Hello", &[]).await;

        match result {
            Err(LlmError::Api(message)) => {
                assert_eq!(message, "This model's maximum context length is 4097 tokens.")
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_empty_choices_is_unexpected_format() {
        let mock = mock_endpoint(200, json!({"model": "gpt-3.5-turbo", "choices": []}));
        let result = provider(&mock.api_base, "sk-test").complete("Hello", &[]).await;
        assert!(matches!(result, Err(LlmError::UnexpectedFormat)));
    }

    #[actix_web::test]
    async fn test_usage_counts_saturate() {
        let mock = mock_endpoint(
            200,
            json!({
                "model": "gpt-3.5-turbo",
                "choices": [{"message": {"role": "assistant", "content": "ok"}}],
                "usage": {"prompt_tokens": 5_000_000_000u64, "completion_tokens": 7}
            }),
        );
        let response = provider(&mock.api_base, "sk-test")
            .complete("Hello", &[])
            .await
            .unwrap();

        let usage = response.usage.expect("usage missing");
        assert_eq!(usage.input_tokens, u32::MAX);
        assert_eq!(usage.output_tokens, 7);
        // Without a reported total the sum is used
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[actix_web::test]
    async fn test_missing_key_skips_network() {
        let mock = mock_endpoint(200, success_body());

        for key in ["", "   ", PLACEHOLDER_API_KEY] {
            let client = provider(&mock.api_base, key);
            assert!(!client.is_configured());
            let result = client.complete("Hello", &[]).await;
            assert!(matches!(result, Err(LlmError::NotConfigured)));
        }

        assert_eq!(mock.hits(), 0);
        assert!(provider(&mock.api_base, "sk-test").is_configured());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            LlmError::RateLimited.user_message(),
            "You have exceeded the request limit. Please try again later."
        );
        assert_eq!(LlmError::Api("quota".to_string()).user_message(), "quota");
        assert_ne!(LlmError::Unauthorized.user_message(), LlmError::NotConfigured.user_message());
    }
}
