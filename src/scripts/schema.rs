diesel::table! {
    prompt_scripts (id) {
        id -> Integer,
        user_id -> Text,
        family -> Text,
        content_type -> Text,
        version -> Integer,
        content -> Text,
        is_active -> Bool,
        created_at -> BigInt,
    }
}

diesel::table! {
    script_profiles (id) {
        id -> Integer,
        user_id -> Text,
        name -> Text,
        content -> Text,
        is_default -> Bool,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    script_corrections (id) {
        id -> Integer,
        user_id -> Text,
        content_type -> Text,
        original_text -> Text,
        corrected_text -> Text,
        note -> Nullable<Text>,
        created_at -> BigInt,
    }
}

diesel::table! {
    script_history (id) {
        id -> Integer,
        user_id -> Text,
        content_type -> Text,
        video_id -> Nullable<Integer>,
        prompt -> Text,
        output -> Text,
        created_at -> BigInt,
    }
}
