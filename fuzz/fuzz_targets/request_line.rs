//! Parse arbitrary request lines the way a session worker does, for both an
//! anonymous and a logged-in session. Nothing may panic, and anonymous
//! sessions must never get past authorization for gated verbs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use palaver_core::{ChatError, Request, SessionStatus, authorize};
use palaver_proto::{Name, Verb, split_request_line, trim_line_end};

fuzz_target!(|data: &[u8]| {
    let (verb, rest) = split_request_line(trim_line_end(data));
    let Ok(verb) = Verb::parse(verb) else {
        return;
    };

    let anonymous = SessionStatus::default();
    match authorize(verb, &anonymous) {
        Ok(()) => assert!(!verb.requires_auth()),
        Err(err) => assert_eq!(err, ChatError::NotAuthorized),
    }
    if authorize(verb, &anonymous).is_ok() {
        let _ = Request::parse(verb, rest, &anonymous);
    }

    let Ok(name) = Name::parse("fuzz") else {
        return;
    };
    let logged_in = SessionStatus { username: Some(name), authenticated: true };
    if authorize(verb, &logged_in).is_ok() {
        let _ = Request::parse(verb, rest, &logged_in);
    }
});
