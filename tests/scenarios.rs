use jira_rewrite::config::Config;
use jira_rewrite::domain::header::EncodedHeaderFragment;
use jira_rewrite::domain::message::Message;
use jira_rewrite::mail::codec;
use jira_rewrite::rewrite::message::{HeaderOutcome, MessageRewriter};

fn rewriter() -> MessageRewriter {
    Config::default().build_rewriter().unwrap()
}

fn message(headers: &str) -> Vec<u8> {
    format!("{headers}Message-ID: <1@example.com>\r\n\r\nbody\r\n").into_bytes()
}

fn header(bytes: &[u8], name: &str) -> String {
    let m = Message::parse(bytes).unwrap();
    String::from_utf8(m.header(name).unwrap().to_vec()).unwrap()
}

#[test]
fn ticket_prefix_is_stripped() {
    let raw = message("Subject: Re: [jira] Updated: (HADOOP-4675) Current Ganglia metrics skipped.\r\n");
    let out = rewriter().rewrite(&raw).unwrap();
    assert_eq!(
        out.subject,
        HeaderOutcome::Rewritten {
            original: "Re: [jira] Updated: (HADOOP-4675) Current Ganglia metrics skipped.".to_string(),
            rewritten: "Re: (HADOOP-4675) Current Ganglia metrics skipped.".to_string(),
        }
    );
}

#[test]
fn subject_without_prefix_is_unchanged() {
    let raw = message("Subject: Re: (HADOOP-4675) Current Ganglia metrics skipped.\r\n");
    let out = rewriter().rewrite(&raw).unwrap();
    assert!(matches!(out.subject, HeaderOutcome::NoMatch { .. }));
    assert!(!out.changed());
    assert_eq!(rewriter().rewrite_bytes(&raw).unwrap(), None);
}

#[test]
fn shared_sender_becomes_per_author_address() {
    let raw = message("From: \"Joe Shmo Zeyliger (JIRA)\" <jira@apache.org>\r\n");
    let out = rewriter().rewrite_bytes(&raw).unwrap().unwrap();
    assert_eq!(
        header(&out, "From"),
        "\"Joe Shmo Zeyliger (JIRA)\" <Joe.Shmo.Zeyliger.JIRA.@fake.jira.apache.org>"
    );
}

#[test]
fn other_sender_shapes_are_left_alone() {
    for from in [
        "jira@apache.org",
        "Joe Shmo <jira@apache.org>",
        "\"Joe Shmo (JIRA)\" <joe@example.com>",
    ] {
        let raw = message(&format!("From: {from}\r\n"));
        let out = rewriter().rewrite(&raw).unwrap();
        assert!(!out.changed(), "{from}");
        assert_eq!(header(&out.bytes, "From"), from);
    }
}

#[test]
fn reply_to_is_always_the_tracker_address() {
    for raw in [
        message("Subject: [jira] Created: (HDFS-1) x\r\n"),
        message("Subject: nothing to do\r\n"),
        message("Reply-To: someone@example.com\r\n"),
    ] {
        let out = rewriter().rewrite(&raw).unwrap();
        assert_eq!(header(&out.bytes, "Reply-To"), "jira@apache.org");
    }
}

#[test]
fn rewriting_twice_equals_rewriting_once() {
    let raw = message(
        "From: \"Ann Lee (JIRA)\" <jira@apache.org>\r\n\
Subject: =?utf-8?q?=5Bjira=5D_Resolved:_=28HDFS-9=29_Gr=C3=BC=C3=9Fe?=\r\n",
    );
    let once = rewriter().rewrite_bytes(&raw).unwrap().unwrap();
    let twice = rewriter().rewrite(&once).unwrap();
    assert!(!twice.changed());
    assert_eq!(twice.bytes, once);
}

#[test]
fn mixed_charset_subject_keeps_untouched_charsets() {
    let raw = message(
        "Subject: =?iso-8859-1?q?=E9t=E9?= [jira] Updated: (HADOOP-1) =?koi8-r?b?8NLJ18XU?=\r\n",
    );
    let out = rewriter().rewrite_bytes(&raw).unwrap().unwrap();
    assert_eq!(
        codec::decode(&header(&out, "Subject")).unwrap(),
        vec![
            EncodedHeaderFragment::encoded("été", "iso-8859-1"),
            EncodedHeaderFragment::native(" (HADOOP-1) "),
            EncodedHeaderFragment::encoded("Привет", "koi8-r"),
        ]
    );
}

#[test]
fn other_headers_and_body_survive() {
    let raw = message("X-Custom: kept\r\nSubject: [jira] Created: (HDFS-1) x\r\n");
    let out = rewriter().rewrite_bytes(&raw).unwrap().unwrap();
    assert_eq!(header(&out, "X-Custom"), "kept");
    assert_eq!(header(&out, "Message-ID"), "<1@example.com>");
    assert!(out.ends_with(b"\r\n\r\nbody\r\n"));
}

#[test]
fn long_encoded_subject_is_folded() {
    let words = "=?utf-8?b?w7zDvMO8w7zDvMO8w7zDvMO8w7zDvMO8w7zDvMO8w7zDvMO8w7zDvMO8w7zDvMO8?=";
    let raw = message(&format!(
        "Subject: [jira] Created: (HDFS-1) {words}\r\n {words} end\r\n"
    ));
    let out = rewriter().rewrite_bytes(&raw).unwrap().unwrap();
    let text = String::from_utf8(out.clone()).unwrap();
    let headers = text.split("\r\n\r\n").next().unwrap();
    assert!(headers.lines().all(|line| line.len() <= 76), "{headers}");

    let subject = header(&out, "Subject");
    assert!(subject.contains("\r\n "));
    let fragments = codec::decode(&subject).unwrap();
    assert_eq!(fragments[0], EncodedHeaderFragment::native("(HDFS-1) "));
    assert_eq!(fragments[1], EncodedHeaderFragment::encoded("ü".repeat(60), "utf-8"));
    assert_eq!(fragments[2], EncodedHeaderFragment::native(" end"));
}
