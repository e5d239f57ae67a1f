//! Diesel table definitions for the loyalty schema.
//!
//! Kept in sync with `backend/migrations` by hand.

diesel::table! {
    /// Partner businesses.
    partners (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    /// Registered clients.
    clients (id) {
        id -> Uuid,
    }
}

diesel::table! {
    /// Loyalty programs owned by partners.
    loyalty_programs (id) {
        id -> Uuid,
        partner_id -> Uuid,
        title -> Text,
        target -> Int4,
    }
}

diesel::table! {
    /// Per-client usage counters.
    usage_counters (client_id, loyalty_program_id) {
        client_id -> Uuid,
        loyalty_program_id -> Uuid,
        usage_count -> Int4,
    }
}

diesel::table! {
    /// Append-only partner statistics.
    scan_stat_events (id) {
        id -> Int8,
        partner_id -> Uuid,
        loyalty_program_id -> Uuid,
        occurred_at -> Timestamptz,
        kind -> Text,
    }
}

diesel::table! {
    /// Engagement flags per partner, client and program.
    engagement_summaries (partner_id, client_id, loyalty_program_id) {
        partner_id -> Uuid,
        client_id -> Uuid,
        loyalty_program_id -> Uuid,
        started -> Bool,
        returned -> Bool,
        finished -> Bool,
    }
}

diesel::table! {
    /// Cross-partner achievement definitions.
    achievements (id) {
        id -> Uuid,
        title -> Text,
        target -> Int4,
    }
}

diesel::table! {
    /// Per-client achievement progress.
    achievement_counters (client_id, achievement_id) {
        client_id -> Uuid,
        achievement_id -> Uuid,
        progress_count -> Int4,
    }
}

diesel::table! {
    /// Receipts for idempotent scan replays.
    scan_idempotency_keys (key, partner_id, mutation_type) {
        key -> Uuid,
        partner_id -> Uuid,
        mutation_type -> Text,
        payload_hash -> Bytea,
        response_snapshot -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(loyalty_programs -> partners (partner_id));
diesel::joinable!(usage_counters -> loyalty_programs (loyalty_program_id));
diesel::joinable!(usage_counters -> clients (client_id));
diesel::joinable!(scan_stat_events -> loyalty_programs (loyalty_program_id));
diesel::joinable!(achievement_counters -> achievements (achievement_id));
diesel::joinable!(achievement_counters -> clients (client_id));
diesel::joinable!(scan_idempotency_keys -> partners (partner_id));

diesel::allow_tables_to_appear_in_same_query!(
    achievement_counters,
    achievements,
    clients,
    engagement_summaries,
    loyalty_programs,
    partners,
    scan_idempotency_keys,
    scan_stat_events,
    usage_counters,
);
