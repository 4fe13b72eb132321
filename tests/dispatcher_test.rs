//! Integration tests for the request dispatcher: token checks, the
//! single refresh-and-retry on 401 and reply classification

mod test_utils;

#[cfg(test)]
mod tests {
    use futures::future::AbortHandle;
    use mockito::Matcher;
    use serde_json::json;

    use septa::chat::{ChatError, Reply, ResponseMode};

    use crate::test_utils::{
        expired_token, fresh_token, hanging_server, jwt, now, test_dispatcher,
        test_dispatcher_with_endpoint, test_dispatcher_with_urls,
    };

    /// Tests an expired token is replaced before the question is sent
    /// with the fresh one
    #[tokio::test]
    async fn it_fetches_token_then_asks() {
        let mut server = mockito::Server::new_async().await;
        let access_token = jwt(now() + 3600);

        let token_mock = server
            .mock("GET", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": access_token, "refresh_token": "r1"}).to_string())
            .expect(1)
            .create_async()
            .await;
        let ask_mock = server
            .mock("POST", "/ask")
            .match_header("authorization", format!("Bearer {}", access_token).as_str())
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "type": "English",
                "question": "hello",
                "conversationId": "conv_1"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result": "Hi! How can I help?"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(expired_token("r0"));

        let reply = dispatcher
            .ask("hello", ResponseMode::Text, "conv_1")
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text("Hi! How can I help?".to_string()));

        token_mock.assert_async().await;
        ask_mock.assert_async().await;
    }

    /// Tests a 401 triggers exactly one refresh and one retry
    #[tokio::test]
    async fn it_refreshes_and_retries_once_on_401() {
        let mut server = mockito::Server::new_async().await;
        let old = fresh_token("r1");
        let new_access_token = jwt(now() + 7200);

        let fetch_mock = server
            .mock("GET", "/token")
            .expect(0)
            .create_async()
            .await;
        let refresh_mock = server
            .mock("POST", "/token")
            .match_body(Matcher::Json(
                json!({"action": "refresh", "refresh_token": "r1"}),
            ))
            .with_status(200)
            .with_body(json!({"access_token": new_access_token}).to_string())
            .expect(1)
            .create_async()
            .await;
        let rejected_mock = server
            .mock("POST", "/ask")
            .match_header("authorization", format!("Bearer {}", old.access_token).as_str())
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let accepted_mock = server
            .mock("POST", "/ask")
            .match_header("authorization", format!("Bearer {}", new_access_token).as_str())
            .with_status(200)
            .with_body(r#"{"result": "after refresh"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(old);

        let reply = dispatcher
            .ask("hello", ResponseMode::Text, "conv_1")
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text("after refresh".to_string()));
        assert_eq!(
            dispatcher.tokens().token().unwrap().access_token,
            new_access_token
        );

        fetch_mock.assert_async().await;
        refresh_mock.assert_async().await;
        rejected_mock.assert_async().await;
        accepted_mock.assert_async().await;
    }

    /// Tests a second 401 ends the turn without a third attempt
    #[tokio::test]
    async fn it_fails_after_second_401() {
        let mut server = mockito::Server::new_async().await;

        let refresh_mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(json!({"access_token": jwt(now() + 3600)}).to_string())
            .expect(1)
            .create_async()
            .await;
        let ask_mock = server
            .mock("POST", "/ask")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let result = dispatcher.ask("hello", ResponseMode::Text, "conv_1").await;
        assert!(matches!(result, Err(ChatError::Auth(_))));

        refresh_mock.assert_async().await;
        ask_mock.assert_async().await;
    }

    /// Tests a failed refresh after a 401 is an auth error and the
    /// question is not sent again
    #[tokio::test]
    async fn it_fails_when_refresh_fails() {
        let mut server = mockito::Server::new_async().await;

        let _refresh_mock = server
            .mock("POST", "/token")
            .with_status(400)
            .create_async()
            .await;
        let ask_mock = server
            .mock("POST", "/ask")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let result = dispatcher.ask("hello", ResponseMode::Text, "conv_1").await;
        assert!(matches!(result, Err(ChatError::Auth(_))));
        ask_mock.assert_async().await;
    }

    /// Tests other error statuses are not retried and carry the status
    #[tokio::test]
    async fn it_fails_on_server_error_without_retry() {
        let mut server = mockito::Server::new_async().await;

        let refresh_mock = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;
        let ask_mock = server
            .mock("POST", "/ask")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let result = dispatcher.ask("hello", ResponseMode::Table, "conv_1").await;
        assert!(matches!(result, Err(ChatError::Request { status: 500 })));

        refresh_mock.assert_async().await;
        ask_mock.assert_async().await;
    }

    /// Tests a failing token fetch stops the turn before the question
    #[tokio::test]
    async fn it_fails_when_token_fetch_fails() {
        let mut server = mockito::Server::new_async().await;

        let _token_mock = server
            .mock("GET", "/token")
            .with_status(500)
            .create_async()
            .await;
        let ask_mock = server
            .mock("POST", "/ask")
            .expect(0)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        let result = dispatcher.ask("hello", ResponseMode::Text, "conv_1").await;
        assert!(matches!(result, Err(ChatError::Auth(_))));
        ask_mock.assert_async().await;
    }

    /// Tests table answers are parsed into headers and rows
    #[tokio::test]
    async fn it_parses_table_reply() {
        let mut server = mockito::Server::new_async().await;
        let _ask_mock = server
            .mock("POST", "/ask")
            .match_body(Matcher::PartialJson(json!({"type": "Table"})))
            .with_status(200)
            .with_body(json!({"result": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]}).to_string())
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        match dispatcher.ask("totals", ResponseMode::Table, "conv_1").await {
            Ok(Reply::Table(table)) => {
                assert_eq!(table.headers, vec!["A", "B"]);
                assert_eq!(table.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
            }
            other => panic!("Expected a table, got {:?}", other),
        }
    }

    /// Tests two chart answers never share a container id
    #[tokio::test]
    async fn it_gives_each_chart_a_unique_id() {
        let mut server = mockito::Server::new_async().await;
        let html = r#"<div id="chart_div"></div><script>draw("chart_div")</script>"#;
        let _ask_mock = server
            .mock("POST", "/ask")
            .match_body(Matcher::PartialJson(json!({"type": "Chart"})))
            .with_status(200)
            .with_body(json!({"result": html}).to_string())
            .expect(2)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let mut ids = Vec::new();
        for _ in 0..2 {
            match dispatcher.ask("plot", ResponseMode::Chart, "conv_1").await {
                Ok(Reply::Chart(chart)) => ids.push(chart.container_id),
                other => panic!("Expected a chart, got {:?}", other),
            }
        }
        assert_ne!(ids[0], ids[1]);
    }

    /// Tests answers without a usable result are empty, not errors
    #[tokio::test]
    async fn it_treats_missing_result_as_empty() {
        let mut server = mockito::Server::new_async().await;
        let _ask_mock = server
            .mock("POST", "/ask")
            .with_status(200)
            .with_body(r#"{"result": null}"#)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let reply = dispatcher
            .ask("hello", ResponseMode::Text, "conv_1")
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);
    }

    /// Tests a body that isn't JSON is a malformed response
    #[tokio::test]
    async fn it_rejects_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _ask_mock = server
            .mock("POST", "/ask")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher(&server.url());
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let result = dispatcher.ask("hello", ResponseMode::Text, "conv_1").await;
        assert!(matches!(result, Err(ChatError::MalformedResponse(_))));
    }

    /// Tests aborting an in-flight question ends with `Cancelled`
    #[tokio::test]
    async fn it_aborts_in_flight_question() {
        let server = mockito::Server::new_async().await;
        let endpoint = format!("{}/ask", hanging_server().await);

        let mut dispatcher = test_dispatcher_with_endpoint(&server.url(), &endpoint);
        dispatcher.tokens_mut().restore(fresh_token("r1"));

        let (handle, registration) = AbortHandle::new_pair();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            handle.abort();
        });

        let result = dispatcher
            .ask_cancellable("hello", ResponseMode::Text, "conv_1", registration)
            .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
    }

    /// Tests aborting while a token is being fetched never sends the
    /// question
    #[tokio::test]
    async fn it_aborts_during_token_fetch() {
        let mut server = mockito::Server::new_async().await;
        let token_server = hanging_server().await;
        let ask_mock = server
            .mock("POST", "/ask")
            .expect(0)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher_with_urls(
            &format!("{}/token", token_server),
            &format!("{}/ask", server.url()),
        );

        let (handle, registration) = AbortHandle::new_pair();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            handle.abort();
        });

        let result = dispatcher
            .ask_cancellable("hello", ResponseMode::Text, "conv_1", registration)
            .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert!(dispatcher.tokens().token().is_none());
        ask_mock.assert_async().await;
    }

    /// Tests aborting during the refresh that follows a 401 stops the
    /// turn without retrying and leaves the held token alone
    #[tokio::test]
    async fn it_aborts_during_refresh_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let token_server = hanging_server().await;
        let old = fresh_token("r1");

        let ask_mock = server
            .mock("POST", "/ask")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut dispatcher = test_dispatcher_with_urls(
            &format!("{}/token", token_server),
            &format!("{}/ask", server.url()),
        );
        dispatcher.tokens_mut().restore(old.clone());

        let (handle, registration) = AbortHandle::new_pair();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            handle.abort();
        });

        let result = dispatcher
            .ask_cancellable("hello", ResponseMode::Text, "conv_1", registration)
            .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(dispatcher.tokens().token(), Some(&old));
        ask_mock.assert_async().await;
    }
}
