//! Property-based test generators using proptest.

use crate::fixtures::{renamed, user, SELF_DOMAIN};
use msgsync_protocol::{ConversationId, Event, EventId, UserId};
use proptest::prelude::*;

/// Strategy for event ids. Zero-padded so string order is numeric order.
pub fn event_id_strategy() -> impl Strategy<Value = EventId> {
    (0u32..1_000_000).prop_map(|n| EventId::new(format!("{n:08}")))
}

/// Strategy for batches of distinct event ids in random order.
pub fn shuffled_ids_strategy(max_len: usize) -> impl Strategy<Value = Vec<EventId>> {
    prop::collection::btree_set(0u32..1_000_000, 1..=max_len.max(1))
        .prop_map(|ids| {
            ids.into_iter()
                .map(|n| EventId::new(format!("{n:08}")))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Strategy for rename events of `conversation` with distinct ids in random order.
pub fn shuffled_renames_strategy(
    conversation: ConversationId,
    max_len: usize,
) -> impl Strategy<Value = Vec<Event>> {
    shuffled_ids_strategy(max_len).prop_map(move |ids| {
        ids.iter()
            .map(|id| renamed(id.as_str(), &conversation, &format!("name-{}", id.as_str())))
            .collect()
    })
}

/// Strategy for domain names, the self domain excluded.
pub fn foreign_domain_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{2,8}\\.(com|org|net)")
        .expect("Invalid regex")
        .prop_filter("must not be the self domain", |domain| domain != SELF_DOMAIN)
}

/// Strategy for member lists spread over the self domain and `domains`.
pub fn members_strategy(domains: Vec<String>, max_len: usize) -> impl Strategy<Value = Vec<UserId>> {
    let mut all = domains;
    all.push(SELF_DOMAIN.to_string());
    prop::collection::vec(prop::sample::select(all), 0..=max_len).prop_map(|picked| {
        picked
            .into_iter()
            .enumerate()
            .map(|(index, domain)| user(&format!("member{index}"), &domain))
            .collect()
    })
}
