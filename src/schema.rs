// Kept in sync with src/store/schema_sqlite.sql by hand.

diesel::table! {
    channels (url) {
        url -> Text,
        handle -> Text,
        followers -> BigInt,
        visits -> BigInt,
        last_scraped -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    posts (id) {
        id -> Integer,
        channel_url -> Text,
        identity -> Text,
        visit -> BigInt,
        ordinal -> BigInt,
        caption -> Text,
        likes -> BigInt,
        comments -> BigInt,
        shares -> BigInt,
        views -> BigInt,
        url -> Nullable<Text>,
        posted_at -> Nullable<Text>,
        post_type -> Text,
        inserted_at -> Text,
    }
}

diesel::joinable!(posts -> channels (channel_url));

diesel::allow_tables_to_appear_in_same_query!(channels, posts);
