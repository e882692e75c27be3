diesel::table! {
    view_alerts (id) {
        id -> Integer,
        user_id -> Text,
        video_id -> Nullable<Integer>,
        alert_type -> Text,
        threshold -> BigInt,
        enabled -> Bool,
        trigger_count -> BigInt,
        last_triggered_at -> Nullable<BigInt>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    alert_history (id) {
        id -> Integer,
        alert_id -> Integer,
        user_id -> Text,
        video_id -> Integer,
        alert_type -> Text,
        period -> Text,
        threshold -> BigInt,
        observed_value -> BigInt,
        message -> Text,
        triggered_at -> BigInt,
    }
}
