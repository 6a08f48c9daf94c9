//! End-to-end tests for the type-state client against a scripted server.

mod common;

use agentmail_smtp::connection::connect;
use agentmail_smtp::{Address, Client, Error, MailOptions, SmtpConnection};
use common::{Script, serve};

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

#[tokio::test]
async fn sends_a_complete_transaction() {
    let (port, server) = serve(Script::default()).await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap();
    assert_eq!(client.server_info().hostname, "mx.test");

    let client = client.ehlo("agent.test").await.unwrap();
    assert_eq!(client.server_info().max_message_size(), Some(4096));

    let options = MailOptions {
        size: Some(11),
        eight_bit: false,
    };
    let client = client.mail_from(addr("a@x.com"), options).await.unwrap();
    let client = client.rcpt_to(addr("b@x.com")).await.unwrap();
    let mut client = client.data().await.unwrap();
    client.write_body(b"hello\n.dot").await.unwrap();
    let client = client.finish().await.unwrap();
    client.quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(
        transcript,
        vec![
            "EHLO agent.test",
            "MAIL FROM:<a@x.com> SIZE=11",
            "RCPT TO:<b@x.com>",
            "DATA",
            "hello",
            "..dot",
            ".",
            "QUIT",
        ]
    );
}

#[tokio::test]
async fn falls_back_to_helo() {
    let (port, server) = serve(Script {
        ehlo: "502 5.5.1 EHLO not implemented\r\n",
        ..Script::default()
    })
    .await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap();
    let client = client.ehlo("agent.test").await.unwrap();
    assert!(client.server_info().extensions.is_empty());
    client.quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(transcript, vec!["EHLO agent.test", "HELO agent.test", "QUIT"]);
}

#[tokio::test]
async fn recipient_rejection_surfaces_reply() {
    let (port, server) = serve(Script {
        rcpt: "550 5.1.1 No such user\r\n",
        ..Script::default()
    })
    .await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap()
        .ehlo("agent.test")
        .await
        .unwrap();
    let client = client
        .mail_from(addr("a@x.com"), MailOptions::default())
        .await
        .unwrap();
    let rejected = client.rcpt_to(addr("nobody@x.com")).await.unwrap_err();

    assert!(rejected.is_recoverable());
    let (err, client) = rejected.into_parts();
    assert!(err.is_permanent());
    assert!(matches!(err, Error::SmtpError { code: 550, .. }));

    // The session is still open after a refusal.
    client.unwrap().quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert!(!transcript.iter().any(|line| line == "DATA"));
    assert_eq!(transcript.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn refused_message_leaves_session_open() {
    let (port, server) = serve(Script {
        end_of_data: "554 5.7.1 Message rejected\r\n",
        ..Script::default()
    })
    .await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap()
        .ehlo("agent.test")
        .await
        .unwrap();
    let client = client
        .mail_from(addr("a@x.com"), MailOptions::default())
        .await
        .unwrap();
    let mut client = client.rcpt_to(addr("b@x.com")).await.unwrap().data().await.unwrap();
    client.write_body(b"spam").await.unwrap();

    let (err, client) = client.finish().await.unwrap_err().into_parts();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
    client.unwrap().quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(&transcript[transcript.len() - 2..], [".", "QUIT"]);
}

#[tokio::test]
async fn dropped_connection_hands_back_nothing() {
    let (port, server) = serve(Script {
        mail: "",
        ..Script::default()
    })
    .await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap()
        .ehlo("agent.test")
        .await
        .unwrap();
    server.abort();

    let rejected = client
        .mail_from(addr("a@x.com"), MailOptions::default())
        .await
        .unwrap_err();
    assert!(!rejected.is_recoverable());
}

#[tokio::test]
async fn oversized_message_is_refused_locally() {
    let (port, server) = serve(Script::default()).await;

    let client = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap()
        .ehlo("agent.test")
        .await
        .unwrap();
    let options = MailOptions {
        size: Some(10_000),
        eight_bit: false,
    };
    let (err, client) = client
        .mail_from(addr("a@x.com"), options)
        .await
        .unwrap_err()
        .into_parts();
    assert!(matches!(
        err,
        Error::MessageTooLarge {
            size: 10_000,
            limit: 4096
        }
    ));
    client.unwrap().quit().await.unwrap();

    let transcript = server.await.unwrap();
    assert_eq!(transcript, vec!["EHLO agent.test", "QUIT"]);
}

#[tokio::test]
async fn rejected_greeting_is_an_error() {
    let (port, _server) = serve(Script {
        greeting: "554 5.3.2 go away\r\n",
        ..Script::default()
    })
    .await;

    let err = Client::from_stream(connect("127.0.0.1", port).await.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}
