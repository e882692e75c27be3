diesel::table! {
    users (id) {
        id -> Text,
        display_name -> Text,
        channel_id -> Nullable<Text>,
        created_at -> BigInt,
    }
}

diesel::table! {
    videos (id) {
        id -> Integer,
        user_id -> Text,
        youtube_id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        thumbnail_url -> Nullable<Text>,
        published_at -> Nullable<BigInt>,
        view_count -> BigInt,
        like_count -> BigInt,
        comment_count -> BigInt,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
