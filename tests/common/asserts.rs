use super::transport::MockChannel;
use cors_guard::Channel;

pub fn assert_request_header(channel: &MockChannel, name: &str, expected: &str) {
    assert_eq!(
        channel.request_header(name).as_deref(),
        Some(expected),
        "request header {name} of {}",
        channel.uri()
    );
}

pub fn assert_no_request_header(channel: &MockChannel, name: &str) {
    assert!(
        channel.request_header(name).is_none(),
        "unexpected request header {name} on {}",
        channel.uri()
    );
}
