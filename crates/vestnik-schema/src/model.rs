//! The Vestnik schema model.
//!
//! Every table the bot, harvester, worker and brain services touch, in the
//! order `init` reconciles them. The model only ever grows: append a
//! `ColumnSpec` or `IndexSpec`, bump [`MODEL_VERSION`], and the baseline
//! manifest test guarantees nothing previously modeled was removed.

use vestnik_db_schema::IndexColumn::{Asc, Desc};
use vestnik_db_schema::SqlType::{
    BigInt, Boolean, Integer, Numeric, Serial, Text, Time, Timestamptz, Varchar,
};
use vestnik_db_schema::{ColumnSpec, IndexSpec, ModelError, SchemaModel, TableSpec};

/// Bumped whenever an entry is appended to the model.
pub const MODEL_VERSION: u32 = 4;

const fn id() -> ColumnSpec {
    ColumnSpec::new("id", Serial).primary_key()
}

const fn created_at() -> ColumnSpec {
    ColumnSpec::new("created_at", Timestamptz)
        .not_null()
        .with_default("now()")
}

const USERS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("tg_id", BigInt).not_null(),
    ColumnSpec::new("username", Varchar(None)),
    ColumnSpec::new("role", Varchar(Some(32)))
        .not_null()
        .with_default("'guest'"),
    ColumnSpec::new("subscription_expires_at", Timestamptz),
    ColumnSpec::new("referrer_tg_id", BigInt),
    created_at(),
];
const USERS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ux_users_tg_id", "users", &[Asc("tg_id")]).unique(),
    IndexSpec::new("ix_users_role", "users", &[Asc("role")]),
];

const PROMPTS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("key", Varchar(Some(64))).not_null(),
    ColumnSpec::new("text", Text).not_null().with_default("''"),
    ColumnSpec::new("updated_at", Timestamptz)
        .not_null()
        .with_default("now()"),
];
const PROMPTS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ux_prompts_key", "prompts", &[Asc("key")]).unique(),
    IndexSpec::new("ix_prompts_updated_at", "prompts", &[Asc("updated_at")]),
];

const PACKS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("key", Varchar(None)).not_null(),
    ColumnSpec::new("title", Varchar(None)).not_null(),
    ColumnSpec::new("description", Text).not_null().with_default("''"),
    ColumnSpec::new("tier", Varchar(None))
        .not_null()
        .with_default("'tier1'"),
    ColumnSpec::new("prompt_id", Integer),
    ColumnSpec::new("schedule_time", Time),
    ColumnSpec::new("is_active", Boolean)
        .not_null()
        .with_default("true"),
    created_at(),
];
const PACKS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ux_packs_key", "packs", &[Asc("key")]).unique(),
    IndexSpec::new("ix_packs_tier", "packs", &[Asc("tier")]),
    IndexSpec::new("ix_packs_is_active", "packs", &[Asc("is_active")]),
];

const CHANNELS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("tg_channel_id", BigInt),
    ColumnSpec::new("username", Varchar(None)).not_null(),
    ColumnSpec::new("title", Varchar(None)).not_null().with_default("''"),
    ColumnSpec::new("is_active", Boolean)
        .not_null()
        .with_default("true"),
    ColumnSpec::new("is_public", Boolean),
    ColumnSpec::new("added_by", Varchar(Some(32))),
    created_at(),
];
const CHANNELS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ux_channels_username", "channels", &[Asc("username")]).unique(),
    IndexSpec::new("ux_channels_tg_channel_id", "channels", &[Asc("tg_channel_id")])
        .unique()
        .partial("tg_channel_id IS NOT NULL"),
    IndexSpec::new("ix_channels_is_active", "channels", &[Asc("is_active")]),
];

const PACK_CHANNELS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("pack_id", Integer).not_null(),
    ColumnSpec::new("channel_id", Integer).not_null(),
    created_at(),
];
const PACK_CHANNELS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ux_pack_channels_pair",
        "pack_channels",
        &[Asc("pack_id"), Asc("channel_id")],
    )
    .unique(),
    IndexSpec::new("ix_pack_channels_pack_id", "pack_channels", &[Asc("pack_id")]),
];

const USER_PACKS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("pack_id", Integer).not_null(),
    ColumnSpec::new("is_enabled", Boolean)
        .not_null()
        .with_default("true"),
    created_at(),
];
const USER_PACKS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ux_user_packs_pair",
        "user_packs",
        &[Asc("user_id"), Asc("pack_id")],
    )
    .unique(),
    IndexSpec::new("ix_user_packs_user_id", "user_packs", &[Asc("user_id")]),
];

const POSTS_CACHE: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("channel_ref", Varchar(Some(255))).not_null(),
    ColumnSpec::new("message_id", Varchar(Some(64))).not_null(),
    ColumnSpec::new("url", Varchar(Some(512)))
        .not_null()
        .with_default("''"),
    ColumnSpec::new("text", Text).not_null().with_default("''"),
    ColumnSpec::new("parsed_at", Timestamptz)
        .not_null()
        .with_default("now()"),
    ColumnSpec::new("expires_at", Timestamptz).not_null(),
    ColumnSpec::new("is_deleted", Boolean)
        .not_null()
        .with_default("false"),
    ColumnSpec::new("channel_id", Integer),
    ColumnSpec::new("message_id_int", BigInt),
    // v2
    ColumnSpec::new("message_date", Timestamptz),
    ColumnSpec::new("message_text", Text),
    ColumnSpec::new("created_at", Timestamptz),
];
const POSTS_CACHE_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ix_posts_cache_channel_ref", "posts_cache", &[Asc("channel_ref")]),
    IndexSpec::new("ix_posts_cache_expires_at", "posts_cache", &[Asc("expires_at")]),
    IndexSpec::new(
        "ux_posts_cache_pair",
        "posts_cache",
        &[Asc("channel_ref"), Asc("message_id")],
    )
    .unique(),
];

const DELIVERIES: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("channel_ref", Varchar(Some(255))).not_null(),
    ColumnSpec::new("message_id", Varchar(Some(64))).not_null(),
    ColumnSpec::new("sent_at", Timestamptz)
        .not_null()
        .with_default("now()"),
];
const DELIVERIES_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ux_deliveries_pair",
        "deliveries",
        &[Asc("user_id"), Asc("channel_ref"), Asc("message_id")],
    )
    .unique(),
    IndexSpec::new("ix_deliveries_user_id", "deliveries", &[Asc("user_id")]),
    IndexSpec::new("ix_deliveries_sent_at", "deliveries", &[Asc("sent_at")]),
];

// v4: previously created lazily by the worker.
const REPORT_DELIVERIES: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("report_id", Integer).not_null(),
    ColumnSpec::new("sent_at", Timestamptz)
        .not_null()
        .with_default("now()"),
];
const REPORT_DELIVERIES_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ix_report_deliveries_user_id",
        "report_deliveries",
        &[Asc("user_id")],
    ),
    IndexSpec::new(
        "ix_report_deliveries_sent_at",
        "report_deliveries",
        &[Asc("sent_at")],
    ),
    IndexSpec::new(
        "ux_report_deliveries_pair",
        "report_deliveries",
        &[Asc("user_id"), Asc("report_id")],
    )
    .unique(),
];

const USER_SETTINGS: &[ColumnSpec] = &[
    ColumnSpec::new("user_id", Integer).primary_key(),
    ColumnSpec::new("delivery_enabled", Boolean)
        .not_null()
        .with_default("true"),
    ColumnSpec::new("digest_interval_sec", Integer),
    ColumnSpec::new("last_sent_at", Timestamptz),
    ColumnSpec::new("menu_chat_id", BigInt),
    ColumnSpec::new("menu_message_id", Integer),
    ColumnSpec::new("pause_until", Timestamptz),
    ColumnSpec::new("format_mode", Varchar(Some(16)))
        .not_null()
        .with_default("'digest'"),
];
const USER_SETTINGS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ix_user_settings_delivery_enabled",
        "user_settings",
        &[Asc("delivery_enabled")],
    ),
    IndexSpec::new(
        "ix_user_settings_pause_until",
        "user_settings",
        &[Asc("pause_until")],
    ),
];

const SUBSCRIPTIONS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("pack_id", Integer),
    ColumnSpec::new("tier", Varchar(Some(16))).not_null(),
    ColumnSpec::new("started_at", Timestamptz)
        .not_null()
        .with_default("now()"),
    ColumnSpec::new("expires_at", Timestamptz).not_null(),
    ColumnSpec::new("payment_provider", Varchar(None)),
    ColumnSpec::new("auto_renew", Boolean)
        .not_null()
        .with_default("true"),
    // v3
    ColumnSpec::new("starts_at", Timestamptz),
    ColumnSpec::new("ends_at", Timestamptz),
    ColumnSpec::new("status", Varchar(Some(32))),
    ColumnSpec::new("created_at", Timestamptz),
];
const SUBSCRIPTIONS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ix_subscriptions_user_id", "subscriptions", &[Asc("user_id")]),
    IndexSpec::new(
        "ix_subscriptions_expires_at",
        "subscriptions",
        &[Asc("expires_at")],
    ),
    IndexSpec::new("ix_subscriptions_ends_at", "subscriptions", &[Asc("ends_at")]),
];

const USER_CHANNELS: &[ColumnSpec] = &[
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("channel_id", Integer).not_null(),
    created_at(),
];
const USER_CHANNELS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new(
        "ux_user_channels_pair",
        "user_channels",
        &[Asc("user_id"), Asc("channel_id")],
    )
    .unique(),
    IndexSpec::new("ix_user_channels_user_id", "user_channels", &[Asc("user_id")]),
];

const REFERRAL_BALANCE: &[ColumnSpec] = &[
    ColumnSpec::new("user_id", Integer).primary_key(),
    ColumnSpec::new("total_earned", Numeric)
        .not_null()
        .with_default("0"),
    ColumnSpec::new("total_withdrawn", Numeric)
        .not_null()
        .with_default("0"),
];

const PAYMENTS_LOG: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("amount", Numeric).not_null(),
    ColumnSpec::new("currency", Varchar(Some(16))).not_null(),
    ColumnSpec::new("provider", Varchar(None)),
    ColumnSpec::new("status", Varchar(Some(16))).not_null(),
    created_at(),
];
const PAYMENTS_LOG_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ix_payments_log_user_id", "payments_log", &[Asc("user_id")]),
    IndexSpec::new(
        "ix_payments_log_created_at",
        "payments_log",
        &[Asc("created_at")],
    ),
];

const REPORTS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("user_id", Integer).not_null(),
    ColumnSpec::new("pack_id", Integer),
    ColumnSpec::new("pack_key", Varchar(Some(64))),
    ColumnSpec::new("period_start", Timestamptz).not_null(),
    ColumnSpec::new("period_end", Timestamptz).not_null(),
    ColumnSpec::new("sources_json", Text).not_null().with_default("''"),
    ColumnSpec::new("report_text", Text).not_null().with_default("''"),
    created_at(),
    ColumnSpec::new("input_hash", Text),
    ColumnSpec::new("stage2_model", Text),
    ColumnSpec::new("stage1_count", Integer),
];
const REPORTS_INDEXES: &[IndexSpec] = &[
    IndexSpec::new("ix_reports_user_id", "reports", &[Asc("user_id")]),
    IndexSpec::new("ix_reports_created_at", "reports", &[Asc("created_at")]),
    IndexSpec::new(
        "idx_reports_pack_period",
        "reports",
        &[Asc("pack_key"), Asc("period_start"), Asc("period_end")],
    ),
    IndexSpec::new("idx_reports_input_hash", "reports", &[Asc("input_hash")]),
];

const POST_FACTS: &[ColumnSpec] = &[
    id(),
    ColumnSpec::new("channel_ref", Text).not_null(),
    ColumnSpec::new("message_id", Text).not_null(),
    ColumnSpec::new("text_sha256", Text).not_null(),
    ColumnSpec::new("summary", Text).not_null().with_default("''"),
    ColumnSpec::new("url", Text).not_null().with_default("''"),
    ColumnSpec::new("channel_name", Text).not_null().with_default("''"),
    ColumnSpec::new("model", Text).not_null().with_default("''"),
    ColumnSpec::new("updated_at", Timestamptz)
        .not_null()
        .with_default("now()"),
];
const POST_FACTS_INDEXES: &[IndexSpec] = &[IndexSpec::new(
    "idx_post_facts_updated_at",
    "post_facts",
    &[Desc("updated_at")],
)];

/// Every Vestnik table, in reconciliation order.
pub static VESTNIK_TABLES: &[TableSpec] = &[
    TableSpec::new("users", USERS, USERS_INDEXES),
    TableSpec::new("prompts", PROMPTS, PROMPTS_INDEXES),
    TableSpec::new("packs", PACKS, PACKS_INDEXES),
    TableSpec::new("channels", CHANNELS, CHANNELS_INDEXES),
    TableSpec::new("pack_channels", PACK_CHANNELS, PACK_CHANNELS_INDEXES),
    TableSpec::new("user_packs", USER_PACKS, USER_PACKS_INDEXES),
    TableSpec::new("posts_cache", POSTS_CACHE, POSTS_CACHE_INDEXES),
    TableSpec::new("deliveries", DELIVERIES, DELIVERIES_INDEXES),
    TableSpec::new("report_deliveries", REPORT_DELIVERIES, REPORT_DELIVERIES_INDEXES),
    TableSpec::new("user_settings", USER_SETTINGS, USER_SETTINGS_INDEXES),
    TableSpec::new("subscriptions", SUBSCRIPTIONS, SUBSCRIPTIONS_INDEXES),
    TableSpec::new("user_channels", USER_CHANNELS, USER_CHANNELS_INDEXES),
    TableSpec::new("referral_balance", REFERRAL_BALANCE, &[]),
    TableSpec::new("payments_log", PAYMENTS_LOG, PAYMENTS_LOG_INDEXES),
    TableSpec::new("reports", REPORTS, REPORTS_INDEXES),
    TableSpec::new("post_facts", POST_FACTS, POST_FACTS_INDEXES)
        .with_constraints(&["UNIQUE (channel_ref, message_id)"]),
];

/// The validated Vestnik schema model.
pub fn vestnik_model() -> Result<SchemaModel, ModelError> {
    SchemaModel::new(MODEL_VERSION, VESTNIK_TABLES)
}
