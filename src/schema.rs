// Hand-maintained to match `model.rs`; kept in sync manually as the
// ancestor codebase does (no `diesel print-schema` step in this repo).
#![cfg_attr(rustfmt, rustfmt_skip)]

diesel::table! {
    stations (id) {
        id -> Int8,
        code -> Text,
        name -> Text,
        website -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    programs (id) {
        id -> Int8,
        station_id -> Int8,
        ext_id -> Nullable<Text>,
        name -> Text,
        url -> Nullable<Text>,
        description -> Nullable<Text>,
        genre -> Nullable<Text>,
        channel_label -> Nullable<Text>,
        auto_crawl -> Bool,
        crawl_interval_hours -> Nullable<Int4>,
        last_crawled_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    series (id) {
        id -> Int8,
        program_id -> Int8,
        ext_id -> Nullable<Text>,
        name -> Text,
        url -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    works (id) {
        id -> Int8,
        series_id -> Int8,
        title -> Text,
        author -> Nullable<Text>,
        year -> Nullable<Int4>,
        asin -> Nullable<Text>,
        extra -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    episodes (id) {
        id -> Int8,
        work_id -> Int8,
        ext_id -> Nullable<Text>,
        title -> Text,
        episode_number -> Nullable<Int4>,
        published_at -> Nullable<Timestamptz>,
        url -> Nullable<Text>,
        duration_ms -> Nullable<Int4>,
        summary -> Nullable<Text>,
        availability_status -> Text,
        first_seen_at -> Nullable<Timestamptz>,
        last_seen_at -> Nullable<Timestamptz>,
        last_checked_at -> Nullable<Timestamptz>,
        auto_download -> Bool,
        priority -> Int4,
        discovery_source -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    episode_aliases (id) {
        id -> Int8,
        episode_id -> Int8,
        url -> Nullable<Text>,
        ext_id -> Nullable<Text>,
        air_date -> Nullable<Timestamptz>,
        discovery_source -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    assets (id) {
        id -> Int8,
        episode_id -> Int8,
        asset_type -> Text,
        status -> Text,
        source_url -> Nullable<Text>,
        file_path -> Nullable<Text>,
        size_bytes -> Nullable<Int8>,
        checksum -> Nullable<Text>,
        codec -> Nullable<Text>,
        container -> Nullable<Text>,
        bitrate -> Nullable<Int4>,
        channels -> Nullable<Int4>,
        sample_rate -> Nullable<Int4>,
        extra -> Nullable<Jsonb>,
        first_seen_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    download_jobs (id) {
        id -> Int8,
        episode_id -> Int8,
        asset_type -> Text,
        status -> Text,
        reason -> Nullable<Text>,
        command -> Nullable<Text>,
        error -> Nullable<Text>,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    crawl_targets (id) {
        id -> Int8,
        url -> Text,
        kind -> Text,
        name -> Nullable<Text>,
        active -> Bool,
        interval_hours -> Int4,
        last_crawled_at -> Nullable<Timestamptz>,
        next_crawl_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    availability_log (id) {
        id -> Int8,
        episode_id -> Int8,
        checked_at -> Timestamptz,
        was_available -> Bool,
        http_status -> Nullable<Int4>,
    }
}

diesel::joinable!(programs -> stations (station_id));
diesel::joinable!(series -> programs (program_id));
diesel::joinable!(works -> series (series_id));
diesel::joinable!(episodes -> works (work_id));
diesel::joinable!(episode_aliases -> episodes (episode_id));
diesel::joinable!(assets -> episodes (episode_id));
diesel::joinable!(download_jobs -> episodes (episode_id));
diesel::joinable!(availability_log -> episodes (episode_id));

diesel::allow_tables_to_appear_in_same_query!(
    stations,
    programs,
    series,
    works,
    episodes,
    episode_aliases,
    assets,
    download_jobs,
    crawl_targets,
    availability_log,
);
