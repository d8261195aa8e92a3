#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parlor::config::DatabaseConfig;
    use parlor::db::connection;
    use parlor::db::service::DbService;
    use parlor::db::{
        ChatMessage, Conversation, DbPool, DuckDbStore, HistoryStore, MessageStatus, Role,
        StoreError, Subscription,
    };
    use std::time::Duration as StdDuration;

    // In memory database just for tests
    fn get_test_db() -> DbPool {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
        };
        connection::get_connection(&config).unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn message_at(owner: &str, body: &str, role: Role, offset_secs: i64) -> ChatMessage {
        let mut message = ChatMessage::new(owner, body, role, MessageStatus::Sent);
        message.sent_at = base_time() + Duration::seconds(offset_secs);
        message
    }

    async fn next_snapshot(sub: &mut Subscription) -> Vec<ChatMessage> {
        tokio::time::timeout(StdDuration::from_secs(2), sub.next())
            .await
            .expect("snapshot did not arrive")
            .expect("subscription closed")
            .expect("snapshot was an error")
    }

    #[test]
    fn test_message_lifecycle() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        // 1. Insert out of order, plus one message for someone else
        let late = DbService::insert_message(&conn, &message_at("u1", "third", Role::User, 30)).unwrap();
        let early = DbService::insert_message(&conn, &message_at("u1", "first", Role::User, 10)).unwrap();
        DbService::insert_message(&conn, &message_at("u1", "second", Role::Assistant, 20)).unwrap();
        DbService::insert_message(&conn, &message_at("u2", "other", Role::User, 0)).unwrap();
        assert_ne!(late, early);

        // 2. Fetch only u1, oldest first
        let history = DbService::get_messages_for_owner(&conn, "u1").unwrap();
        let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
        assert_eq!(history[0].id.as_deref(), Some(early.as_str()));
        assert_eq!(history[1].role, Role::Assistant);
        assert!(history.iter().all(|m| m.owner_id == "u1"));

        // 3. Delete only touches the owner
        let deleted = DbService::delete_messages_for_owner(&conn, "u1").unwrap();
        assert_eq!(deleted, 3);
        assert!(DbService::get_messages_for_owner(&conn, "u1").unwrap().is_empty());
        assert_eq!(DbService::get_messages_for_owner(&conn, "u2").unwrap().len(), 1);
    }

    #[test]
    fn test_timestamp_and_status_round_trip() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        let mut message = ChatMessage::new("u1", "sorry", Role::Assistant, MessageStatus::Error);
        message.sent_at = base_time() + Duration::microseconds(123_456);
        let mut whole_second = ChatMessage::new("u1", "hello", Role::User, MessageStatus::Sending);
        whole_second.sent_at = base_time() - Duration::seconds(1);

        DbService::insert_message(&conn, &message).unwrap();
        DbService::insert_message(&conn, &whole_second).unwrap();

        let history = DbService::get_messages_for_owner(&conn, "u1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sent_at, whole_second.sent_at);
        assert_eq!(history[0].status, MessageStatus::Sending);
        assert_eq!(history[1].sent_at, message.sent_at);
        assert_eq!(history[1].status, MessageStatus::Error);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_store_rejects_incomplete_messages() {
        let store = DuckDbStore::new(get_test_db());

        let empty_body = ChatMessage::new("u1", "", Role::User, MessageStatus::Sending);
        assert!(matches!(
            store.append(&empty_body).await,
            Err(StoreError::InvalidMessage(_))
        ));

        let no_owner = ChatMessage::new("", "hi", Role::User, MessageStatus::Sending);
        assert!(matches!(
            store.append(&no_owner).await,
            Err(StoreError::InvalidMessage(_))
        ));

        assert!(store.list("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_query_redelivers_full_snapshot() {
        let store = DuckDbStore::new(get_test_db());
        store.append(&message_at("u1", "already there", Role::User, 0)).await.unwrap();

        let mut sub = store.subscribe("u1").await.unwrap();
        let initial = next_snapshot(&mut sub).await;
        assert_eq!(initial.len(), 1);

        let id = store.append(&message_at("u1", "reply", Role::Assistant, 5)).await.unwrap();
        let second = next_snapshot(&mut sub).await;
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].id.as_deref(), Some(id.as_str()));
        assert_eq!(second[1].body, "reply");

        // Another owner's write does not produce a snapshot for u1
        store.append(&message_at("u2", "elsewhere", Role::User, 1)).await.unwrap();
        store.append(&message_at("u1", "earliest", Role::User, -5)).await.unwrap();
        let third = next_snapshot(&mut sub).await;
        let bodies: Vec<&str> = third.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["earliest", "already there", "reply"]);
    }

    #[tokio::test]
    async fn test_purge_notifies_live_query() {
        let store = DuckDbStore::new(get_test_db());
        store.append(&message_at("u1", "one", Role::User, 0)).await.unwrap();

        let mut sub = store.subscribe("u1").await.unwrap();
        assert_eq!(next_snapshot(&mut sub).await.len(), 1);

        assert_eq!(store.purge("u1").unwrap(), 1);
        assert!(next_snapshot(&mut sub).await.is_empty());
    }

    #[test]
    fn test_undecodable_rows_are_errors() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        conn.execute_batch(
            "INSERT INTO messages VALUES ('bad-role', 'u1', 'hi', 'system', 'sent', TIMESTAMP '2025-03-14 09:26:53');
             INSERT INTO messages VALUES ('bad-status', 'u2', 'hi', 'user', 'bogus', TIMESTAMP '2025-03-14 09:26:53');
             INSERT INTO messages VALUES ('bad-time', 'u3', 'hi', 'user', 'sent', 'infinity'::TIMESTAMP);",
        )
        .unwrap();

        for owner in ["u1", "u2", "u3"] {
            assert!(
                DbService::get_messages_for_owner(&conn, owner).is_err(),
                "row for {} decoded",
                owner
            );
        }
    }

    #[tokio::test]
    async fn test_live_query_reports_undecodable_rows() {
        let pool = get_test_db();
        let store = DuckDbStore::new(pool.clone());
        store.append(&message_at("u1", "fine", Role::User, 0)).await.unwrap();

        let mut sub = store.subscribe("u1").await.unwrap();
        assert_eq!(next_snapshot(&mut sub).await.len(), 1);

        {
            let conn = pool.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO messages VALUES ('x', 'u1', 'hi', 'system', 'bogus', TIMESTAMP '2025-03-14 09:26:53')",
            )
            .unwrap();
        }
        store.append(&message_at("u1", "trigger", Role::User, 1)).await.unwrap();

        let delivered = tokio::time::timeout(StdDuration::from_secs(2), sub.next())
            .await
            .expect("snapshot did not arrive")
            .expect("subscription closed");
        assert!(matches!(delivered, Err(StoreError::SubscriptionFailed(_))));

        assert!(matches!(store.list("u1"), Err(StoreError::PersistenceFailed(_))));
        assert!(matches!(
            store.subscribe("u1").await,
            Err(StoreError::SubscriptionFailed(_))
        ));
    }

    #[test]
    fn test_save_conversation() {
        let store = DuckDbStore::new(get_test_db());
        let messages = vec![
            message_at("u1", "answer", Role::Assistant, 20),
            message_at("u1", "question", Role::User, 10),
        ];

        // 1. Dates come from the oldest and newest message
        let first = Conversation::from_messages("u1", messages, Some("Rust questions".to_string()));
        assert_eq!(first.created_at, base_time() + Duration::seconds(10));
        assert_eq!(first.last_activity, base_time() + Duration::seconds(20));
        assert_eq!(first.messages[0].body, "question");

        let first_id = store.save_conversation(&first).unwrap();
        let later = Conversation {
            last_activity: base_time() + Duration::seconds(90),
            ..Conversation::from_messages("u1", vec![message_at("u1", "again", Role::User, 90)], None)
        };
        store.save_conversation(&later).unwrap();

        // 2. Read back, most recent first, with messages intact
        let saved = store.conversations("u1").unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].title, None);
        assert_eq!(saved[1].id.as_deref(), Some(first_id.as_str()));
        assert_eq!(saved[1].title.as_deref(), Some("Rust questions"));
        assert_eq!(saved[1].messages, first.messages);
        assert_eq!(saved[1].created_at, first.created_at);

        // 3. Saving does not touch the live history and needs an owner
        assert!(store.list("u1").unwrap().is_empty());
        assert!(store.conversations("u2").unwrap().is_empty());
        let orphan = Conversation::from_messages("", Vec::new(), Some("  ".to_string()));
        assert_eq!(orphan.title, None);
        assert!(matches!(
            store.save_conversation(&orphan),
            Err(StoreError::InvalidMessage(_))
        ));
    }
}
