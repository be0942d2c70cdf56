//! End-to-end behavior of the automation pipeline over SQLite with a
//! scripted platform.

mod test_utils;

use automations::dispatcher::DispatchStatus;
use automations::models::automation::InteractionKind;
use automations::models::interaction_report::ReportStatus;
use automations::pipeline::{EventOutcome, IgnoreReason};
use automations::platform::{OutboundMessage, Recipient, SendError};
use automations::repositories::{NewChannel, ReportFilter};
use serde_json::json;
use test_utils::{
    ACCESS_TOKEN, ACCOUNT_ID, Harness, PlatformCall, comment_delivery, dm_delivery, parse,
};

fn dm_keyword_rule(keyword: &str, reply: &str) -> serde_json::Value {
    json!({
        "name": format!("{keyword} auto-reply"),
        "interaction_kind": "direct_message",
        "trigger_kind": "keywords",
        "keywords": [keyword],
        "response_kind": "reply_via_direct_message",
        "response_text": reply
    })
}

async fn all_reports(harness: &Harness) -> Vec<automations::models::interaction_report::Model> {
    harness
        .reports
        .list(harness.tenant_id, ReportFilter::default(), None, 100)
        .await
        .unwrap()
}

#[tokio::test]
async fn keyword_direct_message_is_answered_and_recorded() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    let automation_id = harness
        .automation(channel_id, dm_keyword_rule("PRICE", "Prices start at $10"))
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(
            ACCOUNT_ID,
            &[("m-1", "user-1", "what's the price?")],
        )))
        .await;

    assert_eq!(summary.errors, 0);
    assert!(matches!(
        summary.outcomes.as_slice(),
        [EventOutcome::Dispatched {
            status: DispatchStatus::Sent,
            ..
        }]
    ));

    assert_eq!(
        harness.platform.calls(),
        vec![PlatformCall::Message {
            token: ACCESS_TOKEN.to_string(),
            recipient: Recipient::User("user-1".to_string()),
            message: OutboundMessage::Text("Prices start at $10".to_string()),
        }]
    );

    let reports = all_reports(&harness).await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.status, ReportStatus::Sent);
    assert_eq!(report.automation_id, Some(automation_id));
    assert_eq!(report.interaction_kind, InteractionKind::DirectMessage);
    assert_eq!(report.external_user_id, "user-1");
    assert_eq!(report.interaction_text, "what's the price?");
    assert_eq!(report.response_text.as_deref(), Some("Prices start at $10"));

    let stored = harness
        .events
        .find_direct_message(channel_id, "m-1")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.replied);
}

#[tokio::test]
async fn unmatched_event_is_stored_without_report() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "hello")])))
        .await;

    assert_eq!(summary.outcomes, vec![EventOutcome::Unmatched]);
    assert!(harness.platform.calls().is_empty());
    assert!(all_reports(&harness).await.is_empty());

    let stored = harness
        .events
        .find_direct_message(channel_id, "m-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.replied);
}

#[tokio::test]
async fn newest_matching_automation_wins() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "older"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = harness
        .automation(
            channel_id,
            json!({
                "name": "catch-all",
                "interaction_kind": "direct_message",
                "trigger_kind": "match_all",
                "response_kind": "reply_via_direct_message",
                "response_text": "newer"
            }),
        )
        .await
        .unwrap();

    harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price?")])))
        .await;

    let calls = harness.platform.calls();
    assert_eq!(calls.len(), 1, "exactly one automation fires");
    assert!(matches!(
        &calls[0],
        PlatformCall::Message { message: OutboundMessage::Text(text), .. } if text == "newer"
    ));
    assert_eq!(all_reports(&harness).await[0].automation_id, Some(newer));
}

#[tokio::test]
async fn inactive_and_other_kind_automations_never_fire() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();

    let mut inactive = dm_keyword_rule("price", "inactive");
    inactive["is_active"] = json!(false);
    harness.automation(channel_id, inactive).await.unwrap();
    harness
        .automation(
            channel_id,
            json!({
                "name": "comments only",
                "interaction_kind": "comment",
                "trigger_kind": "match_all",
                "response_kind": "reply_in_place",
                "response_text": "thanks"
            }),
        )
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")])))
        .await;

    assert_eq!(summary.outcomes, vec![EventOutcome::Unmatched]);
    assert!(harness.platform.calls().is_empty());
}

#[tokio::test]
async fn redelivery_is_not_dispatched_twice() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();

    let delivery = dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")]);
    harness.engine.handle_delivery(parse(delivery.clone())).await;
    let second = harness.engine.handle_delivery(parse(delivery)).await;

    assert_eq!(
        second.outcomes,
        vec![EventOutcome::Ignored(IgnoreReason::Duplicate)]
    );
    assert_eq!(harness.platform.calls().len(), 1);
    assert_eq!(all_reports(&harness).await.len(), 1);
}

#[tokio::test]
async fn unknown_account_is_dropped() {
    let harness = Harness::new().await.unwrap();
    harness.connected_channel(ACCOUNT_ID).await.unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery("someone-else", &[("m-1", "u", "hi")])))
        .await;

    assert_eq!(
        summary.outcomes,
        vec![EventOutcome::Ignored(IgnoreReason::UnknownChannel)]
    );
}

#[tokio::test]
async fn alternate_routing_id_reaches_the_channel() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .channels
        .add_routing_id(channel_id, "business-page-id")
        .await
        .unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(
            "business-page-id",
            &[("m-1", "user-1", "price")],
        )))
        .await;

    assert!(matches!(
        summary.outcomes.as_slice(),
        [EventOutcome::Dispatched { .. }]
    ));
    assert_eq!(all_reports(&harness).await[0].channel_id, channel_id);
}

#[tokio::test]
async fn disconnected_channel_ignores_events() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();
    harness.channels.deauthorize(channel_id).await.unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")])))
        .await;

    assert_eq!(
        summary.outcomes,
        vec![EventOutcome::Ignored(IgnoreReason::Disconnected)]
    );
    assert!(harness.platform.calls().is_empty());
    assert!(
        harness
            .events
            .find_direct_message(channel_id, "m-1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn own_comments_do_not_trigger_replies() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(
            channel_id,
            json!({
                "name": "thank everyone",
                "interaction_kind": "comment",
                "trigger_kind": "match_all",
                "response_kind": "reply_in_place",
                "response_text": "thanks!"
            }),
        )
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(comment_delivery(ACCOUNT_ID, "c-1", ACCOUNT_ID, "thanks!")))
        .await;

    assert_eq!(
        summary.outcomes,
        vec![EventOutcome::Ignored(IgnoreReason::OwnInteraction)]
    );
    assert!(harness.platform.calls().is_empty());
}

#[tokio::test]
async fn comment_reply_then_private_message() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(
            channel_id,
            json!({
                "name": "link in DMs",
                "interaction_kind": "comment",
                "trigger_kind": "keywords",
                "keywords": ["link"],
                "response_kind": "reply_in_place_and_direct_message",
                "response_text": "Sent you a DM!",
                "response_sequence": [
                    {"kind": "text", "content": "Here is the link"},
                    {"kind": "image", "content": "https://cdn.example.com/promo.png"}
                ]
            }),
        )
        .await
        .unwrap();

    harness
        .engine
        .handle_delivery(parse(comment_delivery(ACCOUNT_ID, "c-9", "user-7", "LINK please")))
        .await;

    let recipient = Recipient::Comment("c-9".to_string());
    assert_eq!(
        harness.platform.calls(),
        vec![
            PlatformCall::Reply {
                token: ACCESS_TOKEN.to_string(),
                comment_id: "c-9".to_string(),
                text: "Sent you a DM!".to_string(),
            },
            PlatformCall::Message {
                token: ACCESS_TOKEN.to_string(),
                recipient: recipient.clone(),
                message: OutboundMessage::Text("Here is the link".to_string()),
            },
            PlatformCall::Message {
                token: ACCESS_TOKEN.to_string(),
                recipient,
                message: OutboundMessage::Attachment {
                    kind: automations::rules::StepKind::Image,
                    url: "https://cdn.example.com/promo.png".to_string(),
                },
            },
        ]
    );

    let report = &all_reports(&harness).await[0];
    assert_eq!(report.interaction_kind, InteractionKind::Comment);
    assert_eq!(report.comment_id.as_deref(), Some("c-9"));
    assert_eq!(report.media_id.as_deref(), Some("media-1"));
    assert_eq!(report.username.as_deref(), Some("fan"));
    assert_eq!(report.response_text.as_deref(), Some("Sent you a DM!"));
    assert!(harness.events.find_comment("c-9").await.unwrap().unwrap().replied);
}

#[tokio::test]
async fn failed_send_is_recorded_as_failed() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();
    harness.platform.script(vec![Some(SendError::Http {
        status: 400,
        body: r#"{"error":{"message":"outside messaging window"}}"#.to_string(),
    })]);

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")])))
        .await;

    assert!(matches!(
        summary.outcomes.as_slice(),
        [EventOutcome::Dispatched {
            status: DispatchStatus::Failed,
            ..
        }]
    ));
    let report = &all_reports(&harness).await[0];
    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.response_text.as_deref(), Some("$10"));
    assert!(
        !harness
            .events
            .find_direct_message(channel_id, "m-1")
            .await
            .unwrap()
            .unwrap()
            .replied
    );
}

#[tokio::test]
async fn failed_reply_skips_the_private_message() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(
            channel_id,
            json!({
                "name": "reply and dm",
                "interaction_kind": "comment",
                "trigger_kind": "match_all",
                "response_kind": "reply_in_place_and_direct_message",
                "response_text": "check DMs"
            }),
        )
        .await
        .unwrap();
    harness.platform.script(vec![Some(SendError::Network("reset".to_string()))]);

    harness
        .engine
        .handle_delivery(parse(comment_delivery(ACCOUNT_ID, "c-1", "user-2", "nice")))
        .await;

    assert_eq!(harness.platform.calls().len(), 1);
    assert_eq!(all_reports(&harness).await[0].status, ReportStatus::Failed);
}

#[tokio::test]
async fn matched_rule_without_credential_records_failure() {
    let harness = Harness::new().await.unwrap();
    let channel = harness
        .channels
        .create(
            harness.tenant_id,
            NewChannel {
                display_name: None,
                external_account_id: Some(ACCOUNT_ID.to_string()),
                routing_ids: Vec::new(),
            },
        )
        .await
        .unwrap();
    harness
        .automation(channel.id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")])))
        .await;

    assert!(matches!(
        summary.outcomes.as_slice(),
        [EventOutcome::Dispatched {
            status: DispatchStatus::Failed,
            ..
        }]
    ));
    assert!(harness.platform.calls().is_empty());
}

#[tokio::test]
async fn sub_events_are_processed_independently() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();

    let delivery = json!({
        "object": "instagram",
        "entry": [
            {"id": ACCOUNT_ID, "messaging": [
                {"sender": "not-an-object", "message": {"mid": "broken"}},
                {"sender": {"id": "user-1"}, "recipient": {"id": ACCOUNT_ID},
                 "message": {"mid": "m-1", "text": "price"}},
                {"sender": {"id": "user-2"}, "recipient": {"id": ACCOUNT_ID},
                 "message": {"mid": "m-2", "text": "hello"}}
            ]},
            {"id": "unknown-account", "messaging": [
                {"sender": {"id": "user-3"}, "recipient": {"id": "unknown-account"},
                 "message": {"mid": "m-3", "text": "price"}}
            ]}
        ]
    });

    let summary = harness.engine.handle_delivery(parse(delivery)).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.outcomes.len(), 3);
    assert!(matches!(summary.outcomes[0], EventOutcome::Dispatched { .. }));
    assert_eq!(summary.outcomes[1], EventOutcome::Unmatched);
    assert_eq!(
        summary.outcomes[2],
        EventOutcome::Ignored(IgnoreReason::UnknownChannel)
    );
    assert_eq!(harness.platform.calls().len(), 1);
}

#[tokio::test]
async fn non_instagram_deliveries_are_dropped() {
    let harness = Harness::new().await.unwrap();
    harness.connected_channel(ACCOUNT_ID).await.unwrap();

    let mut delivery = dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price")]);
    delivery["object"] = json!("page");

    let summary = harness.engine.handle_delivery(parse(delivery)).await;
    assert!(summary.outcomes.is_empty());
    assert!(harness.platform.calls().is_empty());
}

#[tokio::test]
async fn sequence_stops_at_first_failed_step() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(
            channel_id,
            json!({
                "name": "onboarding",
                "interaction_kind": "direct_message",
                "trigger_kind": "match_all",
                "response_kind": "reply_via_direct_message",
                "response_sequence": [
                    {"kind": "text", "content": "one"},
                    {"kind": "text", "content": "two"},
                    {"kind": "audio", "content": "https://cdn.example.com/hello.mp3"}
                ]
            }),
        )
        .await
        .unwrap();
    harness.platform.script(vec![Some(SendError::Http {
        status: 500,
        body: "{}".to_string(),
    })]);

    harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "hi")])))
        .await;

    assert_eq!(harness.platform.calls().len(), 1);
    let reports = all_reports(&harness).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Failed);
    assert_eq!(reports[0].response_text, None);
}

#[tokio::test]
async fn echoes_never_reach_the_matcher() {
    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("hi", "hello back"))
        .await
        .unwrap();

    let delivery = json!({
        "object": "instagram",
        "entry": [{"id": ACCOUNT_ID, "messaging": [{
            "sender": {"id": ACCOUNT_ID},
            "recipient": {"id": "user-1"},
            "message": {"mid": "m-echo", "text": "hi there", "is_echo": true}
        }]}]
    });

    let summary = harness.engine.handle_delivery(parse(delivery)).await;

    assert_eq!(summary.skipped, 1);
    assert!(summary.outcomes.is_empty());
    assert!(harness.platform.calls().is_empty());
    assert!(all_reports(&harness).await.is_empty());
}

#[tokio::test]
async fn replied_flag_failure_does_not_fail_the_event() {
    use sea_orm::ConnectionTrait;

    let harness = Harness::new().await.unwrap();
    let channel_id = harness.connected_channel(ACCOUNT_ID).await.unwrap();
    harness
        .automation(channel_id, dm_keyword_rule("price", "$10"))
        .await
        .unwrap();
    harness
        .db
        .execute_unprepared(
            "CREATE TRIGGER direct_messages_read_only BEFORE UPDATE ON direct_messages \
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .await
        .unwrap();

    let summary = harness
        .engine
        .handle_delivery(parse(dm_delivery(ACCOUNT_ID, &[("m-1", "user-1", "price?")])))
        .await;

    assert_eq!(summary.errors, 0);
    assert!(matches!(
        summary.outcomes.as_slice(),
        [EventOutcome::Dispatched {
            status: DispatchStatus::Sent,
            ..
        }]
    ));
    let reports = all_reports(&harness).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Sent);

    let stored = harness
        .events
        .find_direct_message(channel_id, "m-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.replied);
}
