diesel::table! {
    video_analytics (id) {
        id -> Integer,
        video_id -> Integer,
        user_id -> Text,
        day -> Text,
        views -> BigInt,
        watch_minutes -> BigInt,
        average_view_duration_seconds -> BigInt,
        average_view_percentage -> Double,
        subscribers_gained -> BigInt,
        created_at -> BigInt,
    }
}
