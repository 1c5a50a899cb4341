//! Wire-level tests for the direct-messaging server: full TCP sessions
//! against an in-process instance bound to an OS-assigned port.

use courier_core::Listener;
use courier_test_utils::TestClient;
use serde_json::json;
use std::time::Duration;

async fn start() -> u16 {
    let state = messenger::server_state(messenger::DEFAULT_GREETING);
    let listener = Listener::bind(0, state).await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(listener.serve());
    port
}

/// Give the server a moment to observe a dropped peer.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn registration_then_self_login() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;

    client
        .send("register", json!({ "login": "u", "pass": "p", "nick": "n" }))
        .await;
    assert_eq!(
        client.expect_frame().await,
        json!({ "action": "register", "data": { "status": 0, "error": "OK" } })
    );
    assert_eq!(
        client.expect_frame().await,
        json!({ "action": "auth", "data": {
            "sid": "7b774effe4a349c6dd82ad4f4f21d34c",
            "cid": "u",
            "nick": "n",
            "status": 0,
            "error": "OK"
        } })
    );
}

#[tokio::test]
async fn duplicate_nick_is_rejected_and_closes() {
    let port = start().await;
    let mut first = TestClient::connect(port).await;
    first.register("u", "p", "n").await;

    let mut second = TestClient::connect(port).await;
    second
        .send("register", json!({ "login": "u2", "pass": "p", "nick": "n" }))
        .await;
    let frame = second.expect_status("register", 1).await;
    assert_eq!(frame["data"]["error"], "Nick already was used");
    second.expect_closed().await;
}

#[tokio::test]
async fn duplicate_login_is_rejected_and_closes() {
    let port = start().await;
    let mut first = TestClient::connect(port).await;
    first.register("u", "p", "n").await;

    let mut second = TestClient::connect(port).await;
    second
        .send("register", json!({ "login": "u", "pass": "x", "nick": "n2" }))
        .await;
    let frame = second.expect_status("register", 1).await;
    assert_eq!(frame["data"]["error"], "Login already was used");
    second.expect_closed().await;
}

#[tokio::test]
async fn empty_register_fields_are_rejected() {
    let port = start().await;
    for payload in [
        json!({ "login": "", "pass": "", "nick": "" }),
        json!({ "login": "", "pass": "1", "nick": "1" }),
        json!({ "login": "1", "pass": "", "nick": "1" }),
        json!({ "login": "1", "pass": "1", "nick": "" }),
    ] {
        let mut client = TestClient::connect(port).await;
        client.send("register", payload).await;
        let frame = client.expect_status("register", 4).await;
        assert_eq!(frame["data"]["error"], "Empty field");
        client.expect_closed().await;
    }
}

#[tokio::test]
async fn auth_gate_replies_but_keeps_the_session_open() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;

    client
        .send("message", json!({ "uid": "x", "body": "hi" }))
        .await;
    let frame = client.expect_status("message", 6).await;
    assert_eq!(frame["data"]["error"], "Need auth");

    // The same connection can still register.
    client.register("u", "p", "n").await;
}

#[tokio::test]
async fn auth_failures_close_the_session() {
    let port = start().await;
    let mut setup = TestClient::connect(port).await;
    setup.register("login", "pass", "nick").await;

    let mut empty = TestClient::connect(port).await;
    empty.send("auth", json!({ "login": "", "pass": "" })).await;
    let frame = empty.expect_status("auth", 4).await;
    assert_eq!(frame["data"]["error"], "Empty field");
    empty.expect_closed().await;

    let mut unknown = TestClient::connect(port).await;
    unknown
        .send("auth", json!({ "login": "ghost", "pass": "pass" }))
        .await;
    let frame = unknown.expect_status("auth", 7).await;
    assert_eq!(frame["data"]["error"], "Need to register");
    unknown.expect_closed().await;

    let mut wrong = TestClient::connect(port).await;
    wrong
        .send("auth", json!({ "login": "login", "pass": "nope" }))
        .await;
    let frame = wrong.expect_status("auth", 2).await;
    assert_eq!(frame["data"]["error"], "Invalid login or password!");
    wrong.expect_closed().await;
}

#[tokio::test]
async fn registering_twice_on_one_session_closes() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;
    client.register("u", "p", "n").await;

    client
        .send("register", json!({ "login": "u2", "pass": "p", "nick": "n2" }))
        .await;
    let frame = client.expect_status("register", 5).await;
    assert_eq!(frame["data"]["error"], "Already register");
    client.expect_closed().await;
}

#[tokio::test]
async fn direct_message_round_trip() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("a", "p", "na").await;
    let mut b = TestClient::connect(port).await;
    b.register("b", "p", "nb").await;

    a.send(
        "message",
        json!({ "uid": "b", "body": "hi", "attach": { "mime": "", "data": "" } }),
    )
    .await;

    // The sender observes the status reply and an echo of the event; the
    // order between those two frames is not part of the contract.
    let first = a.expect_frame().await;
    let second = a.expect_frame().await;
    let (echo, reply) = if first["action"] == "ev_message" {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(
        reply,
        json!({ "action": "message", "data": { "status": 0, "error": "OK" } })
    );
    assert_eq!(echo["data"]["from"], "a");
    assert_eq!(echo["data"]["nick"], "na");
    assert_eq!(echo["data"]["body"], "hi");
    assert_eq!(echo["data"]["attach"], json!({ "mime": "", "data": "" }));

    // The recipient's event is identical to the sender's echo.
    let received = b.expect_action("ev_message").await;
    assert_eq!(received, echo);
}

#[tokio::test]
async fn message_boundaries() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("a", "p", "na").await;

    a.send("message", json!({ "uid": "a", "body": "" })).await;
    let frame = a.expect_status("message", 4).await;
    assert_eq!(frame["data"]["error"], "Body is empty");

    a.send("message", json!({ "uid": "ghost", "body": "hi" }))
        .await;
    let frame = a.expect_status("message", 8).await;
    assert_eq!(frame["data"]["error"], "Invalid user");

    // Both failures left the session usable.
    a.send("contactlist", json!({})).await;
    a.expect_status("contactlist", 0).await;
}

#[tokio::test]
async fn contact_management() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("a", "p", "na").await;
    let mut b = TestClient::connect(port).await;
    b.register("b", "p", "nb").await;
    b.send(
        "setuserinfo",
        json!({ "picture": "pic", "email": "b@mail.ru", "phone": "+61", "user_status": "" }),
    )
    .await;
    b.expect_status("setuserinfo", 0).await;

    a.send("addcontact", json!({ "uid": "b" })).await;
    a.expect_status("addcontact", 0).await;

    a.send("addcontact", json!({ "uid": "a" })).await;
    let frame = a.expect_status("addcontact", 1).await;
    assert_eq!(frame["data"]["error"], "User already in list");

    a.send("addcontact", json!({ "uid": "ghost" })).await;
    let frame = a.expect_status("addcontact", 8).await;
    assert_eq!(frame["data"]["error"], "User not found");

    a.send("contactlist", json!({})).await;
    let frame = a.expect_status("contactlist", 0).await;
    assert_eq!(
        frame["data"]["list"],
        json!([{ "uid": "b", "nick": "nb", "email": "b@mail.ru", "phone": "+61", "picture": "pic" }])
    );

    // Deleting an absent contact is still a success.
    a.send("delcontact", json!({ "uid": "b" })).await;
    a.expect_status("delcontact", 0).await;
    a.send("delcontact", json!({ "uid": "b" })).await;
    a.expect_status("delcontact", 0).await;
}

#[tokio::test]
async fn userinfo_lookup() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("a", "p", "na").await;
    a.send(
        "setuserinfo",
        json!({
            "picture": "Base64_Picture",
            "email": "test@mail.ru",
            "phone": "+7999123123123",
            "user_status": "Test State"
        }),
    )
    .await;
    a.expect_status("setuserinfo", 0).await;

    let mut b = TestClient::connect(port).await;
    b.register("b", "p", "nb").await;
    b.send("userinfo", json!({ "user": "a" })).await;
    assert_eq!(
        b.expect_frame().await,
        json!({ "action": "userinfo", "data": {
            "nick": "na",
            "user_status": "Test State",
            "email": "test@mail.ru",
            "phone": "+7999123123123",
            "picture": "Base64_Picture",
            "status": 0,
            "error": "OK"
        } })
    );

    b.send("userinfo", json!({ "user": "ghost" })).await;
    let frame = b.expect_status("userinfo", 8).await;
    assert_eq!(frame["data"]["error"], "User not found");
}

#[tokio::test]
async fn import_matches_by_email_then_phone() {
    let port = start().await;
    for i in 0..4 {
        let mut user = TestClient::connect(port).await;
        user.register(&format!("user{i}"), "pass", &format!("nick{i}"))
            .await;
        user.send(
            "setuserinfo",
            json!({
                "picture": format!("ava{i}"),
                "email": format!("mail{i}@mail.ru"),
                "phone": format!("+6722{i}"),
                "user_status": ""
            }),
        )
        .await;
        user.expect_status("setuserinfo", 0).await;
    }

    let mut importer = TestClient::connect(port).await;
    importer.register("login", "pass", "nick").await;
    importer
        .send(
            "import",
            json!({ "contacts": [
                { "name": "One", "phone": "+67221", "email": "nomatch", "myid": "1" },
                { "name": "Two", "phone": "777", "email": "mail2@mail.ru", "myid": "2" },
                { "name": "Three", "phone": "x", "email": "y", "myid": "3" },
                { "name": "Four", "phone": "", "email": "", "myid": "4" }
            ] }),
        )
        .await;

    let frame = importer.expect_status("import", 0).await;
    assert_eq!(
        frame["data"]["list"],
        json!([
            { "uid": "user1", "nick": "nick1", "email": "mail1@mail.ru",
              "phone": "+67221", "picture": "ava1", "myid": "1" },
            { "uid": "user2", "nick": "nick2", "email": "mail2@mail.ru",
              "phone": "+67222", "picture": "ava2", "myid": "2" }
        ])
    );
}

#[tokio::test]
async fn unknown_actions_are_silently_ignored() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;
    client.register("u", "p", "n").await;

    client.send("dance", json!({ "x": 1 })).await;
    client.send("contactlist", json!({})).await;
    // The first and only reply belongs to contactlist.
    client.expect_status("contactlist", 0).await;
}

#[tokio::test]
async fn channel_actions_do_not_exist_here() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;
    client.register("u", "p", "n").await;

    client.send("enter", json!({ "channel": "x" })).await;
    client.send("channellist", json!({})).await;
    client.send("contactlist", json!({})).await;
    client.expect_status("contactlist", 0).await;
}

#[tokio::test]
async fn malformed_json_is_fatal() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;

    client.send_raw(b"garbage").await;
    assert_eq!(
        client.expect_frame().await,
        json!({ "action": "unknown", "data": { "status": 3, "error": "Invalid request" } })
    );
    client.expect_closed().await;
}

#[tokio::test]
async fn malformed_payload_is_fatal() {
    let port = start().await;
    let mut client = TestClient::connect(port).await;
    client.register("u", "p", "n").await;

    client.send("message", json!([1, 2, 3])).await;
    let frame = client.expect_status("message", 3).await;
    assert_eq!(frame["data"]["error"], "Invalid data");
    client.expect_closed().await;
}

#[tokio::test]
async fn offline_queue_drains_after_reconnect() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("alice", "p", "na").await;

    {
        let mut b = TestClient::connect(port).await;
        b.register("bob", "p", "nb").await;
        b.send(
            "setuserinfo",
            json!({ "picture": "pic", "email": "bob@mail.ru", "phone": "+1", "user_status": "away" }),
        )
        .await;
        b.expect_status("setuserinfo", 0).await;
        b.send("addcontact", json!({ "uid": "alice" })).await;
        b.expect_status("addcontact", 0).await;
        // b drops off the network here.
    }
    settle().await;

    a.send("message", json!({ "uid": "bob", "body": "missed you" }))
        .await;
    a.expect_event("ev_message").await;

    // Reconnect as bob: the queued event must directly follow the auth
    // reply, and the profile plus contacts must have survived.
    let mut b = TestClient::connect(port).await;
    b.auth("bob", "p").await;
    let frame = b.expect_action("ev_message").await;
    assert_eq!(frame["data"]["from"], "alice");
    assert_eq!(frame["data"]["body"], "missed you");

    b.send("contactlist", json!({})).await;
    let frame = b.expect_status("contactlist", 0).await;
    assert_eq!(frame["data"]["list"][0]["uid"], "alice");

    b.send("userinfo", json!({ "user": "bob" })).await;
    let frame = b.expect_status("userinfo", 0).await;
    assert_eq!(frame["data"]["email"], "bob@mail.ru");
    assert_eq!(frame["data"]["phone"], "+1");
    assert_eq!(frame["data"]["picture"], "pic");
    assert_eq!(frame["data"]["user_status"], "away");
}

#[tokio::test]
async fn takeover_displaces_the_live_session() {
    let port = start().await;
    let mut a = TestClient::connect(port).await;
    a.register("a", "p", "na").await;

    let mut first = TestClient::connect(port).await;
    first.register("bob", "p", "nb").await;

    let mut second = TestClient::connect(port).await;
    second.auth("bob", "p").await;

    // The displaced session reads EOF; the new one receives traffic.
    first.expect_closed().await;
    a.send("message", json!({ "uid": "bob", "body": "hello" }))
        .await;
    a.expect_event("ev_message").await;
    let frame = second.expect_action("ev_message").await;
    assert_eq!(frame["data"]["body"], "hello");
}
