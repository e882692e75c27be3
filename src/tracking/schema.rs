diesel::table! {
    daily_view_stats (id) {
        id -> Integer,
        video_id -> Integer,
        user_id -> Text,
        recorded_at -> BigInt,
        view_count -> BigInt,
        like_count -> BigInt,
        comment_count -> BigInt,
        views_delta -> BigInt,
        likes_delta -> BigInt,
        comments_delta -> BigInt,
        growth_rate -> BigInt,
    }
}
