//! Integration tests for the ReAct loop against a stub HTTP server.

mod common;

use agentry::{
    tool, Agent, ContentBlock, Error, HttpPool, Llm, LlmConfig, PoolConfig, TerminalReason,
    ToolRegistry, TOOL_ERROR_PREFIX,
};
use common::{StubResponse, StubServer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn isolated_pool() -> Arc<HttpPool> {
    HttpPool::new(PoolConfig {
        max_connections: 2,
        acquire_timeout: Duration::from_secs(1),
        ..PoolConfig::default()
    })
    .unwrap()
}

fn openai_llm(base_url: &str) -> Arc<Llm> {
    Arc::new(
        Llm::with_pool(
            LlmConfig::builder()
                .provider("openai")
                .model("test-model")
                .api_key("test-key")
                .api_base(base_url)
                .build()
                .unwrap(),
            isolated_pool(),
        )
        .unwrap(),
    )
}

fn text_response(text: &str) -> StubResponse {
    StubResponse::Json(
        200,
        format!(
            r#"{{"choices":[{{"message":{{"content":"{text}"}},"finish_reason":"stop"}}],
                "usage":{{"prompt_tokens":10,"completion_tokens":2}}}}"#
        ),
    )
}

fn tool_call_response(id: &str, name: &str, arguments: &str) -> StubResponse {
    StubResponse::Json(
        200,
        format!(
            r#"{{"choices":[{{"message":{{"content":null,"tool_calls":[
                {{"id":"{id}","type":"function","function":{{"name":"{name}","arguments":"{}"}}}}
            ]}},"finish_reason":"tool_calls"}}],
            "usage":{{"prompt_tokens":15,"completion_tokens":8}}}}"#,
            arguments.replace('"', "\\\"")
        ),
    )
}

fn add_registry(calls: Arc<Mutex<Vec<(i64, i64)>>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .add(
            tool("add", "Add two integers")
                .param("a", "integer")
                .param("b", "integer")
                .build(move |args| {
                    let calls = calls.clone();
                    async move {
                        let a = args["a"].as_i64().unwrap_or(0);
                        let b = args["b"].as_i64().unwrap_or(0);
                        calls.lock().unwrap().push((a, b));
                        Ok((a + b).to_string())
                    }
                }),
        )
        .unwrap();
    registry
}

// Plain chat: no tools, single iteration.
#[tokio::test]
async fn test_plain_chat() {
    let server = StubServer::start(vec![text_response("hi")]).await;
    let llm = openai_llm(&server.url());

    let mut agent = Agent::builder()
        .llm(llm)
        .max_iterations(1)
        .build()
        .unwrap();

    let result = agent.run("hello").await.unwrap();
    assert_eq!(result.content, "hi");
    assert_eq!(result.iterations, 1);
    assert_eq!(result.terminal, TerminalReason::End);
    assert_eq!(result.usage.input_tokens, 10);
    assert_eq!(result.usage.output_tokens, 2);
}

// One tool round-trip: the model requests add(2,3), gets "5" back, and
// produces the final answer on the second iteration.
#[tokio::test]
async fn test_one_tool_round_trip() {
    let server = StubServer::start(vec![
        tool_call_response("call_1", "add", r#"{"a":2,"b":3}"#),
        text_response("5"),
    ])
    .await;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = add_registry(calls.clone());

    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(3)
        .build()
        .unwrap();

    let result = agent.run("what is 2 + 3?").await.unwrap();

    assert_eq!(result.content, "5");
    assert_eq!(result.iterations, 2);
    assert_eq!(result.terminal, TerminalReason::End);
    assert_eq!(*calls.lock().unwrap(), vec![(2, 3)]);

    // The second request must answer the tool call on the wire.
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].contains("\"tool_call_id\":\"call_1\""));
    assert!(requests[1].contains("\"role\":\"tool\""));
    assert!(requests[1].contains("\"content\":\"5\""));
}

// Iteration cap with outstanding tool calls: the final permitted call
// goes out tool-free, and a model that still requests tools terminates
// the run with MaxIterations.
#[tokio::test]
async fn test_iteration_cap_with_outstanding_tool_calls() {
    let server = StubServer::start(vec![
        tool_call_response("call_1", "add", r#"{"a":1,"b":1}"#),
        tool_call_response("call_2", "add", r#"{"a":2,"b":2}"#),
    ])
    .await;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = add_registry(calls.clone());

    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(2)
        .build()
        .unwrap();

    let result = agent.run("keep adding").await.unwrap();

    assert_eq!(result.iterations, 2);
    assert_eq!(result.terminal, TerminalReason::MaxIterations);
    // Exactly one tool execution, after iteration 1.
    assert_eq!(calls.lock().unwrap().len(), 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    // First call advertises tools; the forced-synthesis call does not.
    assert!(requests[0].contains("\"tools\""));
    assert!(!requests[1].contains("\"tools\""));
}

// A cap of 1 disables tool use entirely.
#[tokio::test]
async fn test_cap_of_one_never_advertises_tools() {
    let server = StubServer::start(vec![text_response("done")]).await;

    let registry = add_registry(Arc::new(Mutex::new(Vec::new())));
    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(1)
        .build()
        .unwrap();

    let result = agent.run("hi").await.unwrap();
    assert_eq!(result.iterations, 1);
    assert!(!server.requests()[0].contains("\"tools\""));
}

// Tool failure containment: the error is injected as a tool result with
// the documented marker and the run completes.
#[tokio::test]
async fn test_tool_error_containment() {
    let server = StubServer::start(vec![
        tool_call_response("call_1", "flaky", r#"{}"#),
        text_response("sorry, the tool failed"),
    ])
    .await;

    let mut registry = ToolRegistry::new();
    registry
        .add(tool("flaky", "Always fails").build(|_| async {
            Err(Error::invalid_arg("disk on fire"))
        }))
        .unwrap();

    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(3)
        .build()
        .unwrap();

    let result = agent.run("try the tool").await.unwrap();
    assert_eq!(result.content, "sorry, the tool failed");

    let requests = server.requests();
    assert!(requests[1].contains(TOOL_ERROR_PREFIX));
    assert!(requests[1].contains("disk on fire"));
}

// Schema mismatches and unknown tools are contained the same way.
#[tokio::test]
async fn test_schema_mismatch_and_unknown_tool_containment() {
    let server = StubServer::start(vec![
        StubResponse::Json(
            200,
            r#"{"choices":[{"message":{"content":null,"tool_calls":[
                {"id":"c1","type":"function","function":{"name":"add","arguments":"{\"a\":2}"}},
                {"id":"c2","type":"function","function":{"name":"ghost","arguments":"{}"}}
            ]},"finish_reason":"tool_calls"}]}"#
                .to_string(),
        ),
        text_response("recovered"),
    ])
    .await;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = add_registry(calls.clone());

    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(3)
        .build()
        .unwrap();

    let result = agent.run("go").await.unwrap();
    assert_eq!(result.content, "recovered");
    // Neither call reached a handler.
    assert!(calls.lock().unwrap().is_empty());

    // Every emitted tool_use was answered, failures included.
    let second = &server.requests()[1];
    assert!(second.contains("\"tool_call_id\":\"c1\""));
    assert!(second.contains("\"tool_call_id\":\"c2\""));
    assert!(second.contains("schema mismatch"));
    assert!(second.contains("unknown tool"));
}

// Conversation integrity: every tool message answers a preceding
// assistant tool_use block.
#[tokio::test]
async fn test_conversation_integrity_with_memory() {
    let server = StubServer::start(vec![
        tool_call_response("call_7", "add", r#"{"a":4,"b":5}"#),
        text_response("9"),
    ])
    .await;

    let registry = add_registry(Arc::new(Mutex::new(Vec::new())));
    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(3)
        .memory(true)
        .build()
        .unwrap();

    agent.run("4 plus 5?").await.unwrap();

    let history = agent.history().unwrap();
    let mut seen_tool_use_ids = Vec::new();
    for message in history {
        for block in &message.content {
            if let ContentBlock::ToolUse(t) = block {
                seen_tool_use_ids.push(t.id.clone());
            }
        }
        if let Some(id) = &message.tool_call_id {
            assert!(
                seen_tool_use_ids.contains(id),
                "tool message {id} has no preceding tool_use"
            );
        }
    }
    // The buffer survives the run for the next turn.
    assert!(history.len() >= 4);
}

// LLM-level failures abort the run with the mapped error.
#[tokio::test]
async fn test_http_status_mapping() {
    for (status, body, check) in [
        (401u16, r#"{"error":"bad key"}"#, "auth"),
        (429, r#"{"error":"slow down"}"#, "rate"),
        (500, r#"{"error":"boom"}"#, "server"),
    ] {
        let server =
            StubServer::start(vec![StubResponse::Json(status, body.to_string())]).await;
        let llm = openai_llm(&server.url());
        let mut agent = Agent::builder().llm(llm).build().unwrap();

        let err = agent.run("hi").await.unwrap_err();
        match check {
            "auth" => assert!(matches!(err, Error::Auth(_)), "got {err:?}"),
            "rate" => assert!(matches!(err, Error::RateLimit(_)), "got {err:?}"),
            _ => assert!(matches!(err, Error::Server(_)), "got {err:?}"),
        }
        // Body preserved for diagnostics.
        assert!(err.to_string().contains("error"));
    }
}

// Iteration count never exceeds the cap.
#[tokio::test]
async fn test_iteration_bound() {
    for cap in [1u32, 2, 4] {
        let responses = (0..cap)
            .map(|i| tool_call_response(&format!("c{i}"), "add", r#"{"a":1,"b":1}"#))
            .collect();
        let server = StubServer::start(responses).await;

        let registry = add_registry(Arc::new(Mutex::new(Vec::new())));
        let mut agent = Agent::builder()
            .llm(openai_llm(&server.url()))
            .tools(Arc::new(registry))
            .max_iterations(cap)
            .build()
            .unwrap();

        let result = agent.run("loop").await.unwrap();
        assert!(result.iterations <= cap);
    }
}

// Independent agents sharing one pool run concurrently.
#[tokio::test]
async fn test_parallel_agents_share_pool() {
    let server = StubServer::start(vec![text_response("one"), text_response("two")]).await;

    let pool = isolated_pool();
    let make = |pool: Arc<HttpPool>| {
        Arc::new(
            Llm::with_pool(
                LlmConfig::builder()
                    .provider("openai")
                    .model("test-model")
                    .api_key("k")
                    .api_base(server.url())
                    .build()
                    .unwrap(),
                pool,
            )
            .unwrap(),
        )
    };

    let mut agent_a = Agent::builder().llm(make(pool.clone())).build().unwrap();
    let mut agent_b = Agent::builder().llm(make(pool.clone())).build().unwrap();

    let (a, b) = tokio::join!(agent_a.run("x"), agent_b.run("y"));
    let mut answers = vec![a.unwrap().content, b.unwrap().content];
    answers.sort();
    assert_eq!(answers, ["one", "two"]);

    let stats = pool.stats();
    assert!(stats.active <= stats.capacity);
    assert_eq!(stats.hits + stats.misses, 2);
}

// Usage counters accumulate across iterations of one run.
#[tokio::test]
async fn test_usage_accumulates_across_iterations() {
    let server = StubServer::start(vec![
        tool_call_response("call_1", "add", r#"{"a":2,"b":3}"#),
        text_response("5"),
    ])
    .await;

    let registry = add_registry(Arc::new(Mutex::new(Vec::new())));
    let mut agent = Agent::builder()
        .llm(openai_llm(&server.url()))
        .tools(Arc::new(registry))
        .max_iterations(3)
        .build()
        .unwrap();

    let result = agent.run("sum").await.unwrap();
    // 15+10 input, 8+2 output across the two calls.
    assert_eq!(result.usage.input_tokens, 25);
    assert_eq!(result.usage.output_tokens, 10);
}
