diesel::table! {
    ab_tests (id) {
        id -> Integer,
        user_id -> Text,
        video_id -> Integer,
        name -> Text,
        test_type -> Text,
        status -> Text,
        winner_variant_id -> Nullable<Integer>,
        started_at -> Nullable<BigInt>,
        ended_at -> Nullable<BigInt>,
        notified_at -> Nullable<BigInt>,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    test_variants (id) {
        id -> Integer,
        test_id -> Integer,
        label -> Text,
        title -> Nullable<Text>,
        thumbnail_url -> Nullable<Text>,
        is_control -> Bool,
        impressions -> BigInt,
        clicks -> BigInt,
        views -> BigInt,
        likes -> BigInt,
        comments -> BigInt,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
