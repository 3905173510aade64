//! Human-readable output: one status line, then a per-table breakdown.

use owo_colors::{OwoColorize, Stream::Stdout};
use std::fmt::Write;
use vestnik_migrate::{InitReport, MigrateError, TablePlan};
use vestnik_schema::{CheckReport, SchemaModel, TableState};

fn width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0)
}

pub fn render_check(report: &CheckReport, strict: bool) -> String {
    let mut out = String::new();
    let drift = report.drift();
    if drift.is_empty() {
        let pending = report.index_drift().count();
        if pending > 0 && strict {
            let _ = writeln!(
                out,
                "{} {} table(s) missing indexes",
                "schema index drift:".if_supports_color(Stdout, |t| t.red()),
                pending
            );
        } else {
            let _ = writeln!(
                out,
                "{} (model v{}, {} tables)",
                "schema ok".if_supports_color(Stdout, |t| t.green()),
                report.model_version,
                report.tables.len()
            );
        }
    } else {
        let _ = writeln!(
            out,
            "{} {} table(s)",
            "schema drift:".if_supports_color(Stdout, |t| t.red()),
            drift.entries.len()
        );
        let _ = writeln!(out, "{}", drift);
    }

    let w = width(report.tables.iter().map(|t| t.table));
    for status in &report.tables {
        let state = status.state.to_string();
        let state = match status.state {
            TableState::Ready => state.if_supports_color(Stdout, |t| t.green()).to_string(),
            TableState::ExistsColumnsComplete => {
                state.if_supports_color(Stdout, |t| t.yellow()).to_string()
            }
            _ => state.if_supports_color(Stdout, |t| t.red()).to_string(),
        };
        let _ = writeln!(out, "  {:<w$}  {}", status.table, state, w = w);
        if status.state == TableState::Unknown {
            let _ = writeln!(out, "      table missing");
        } else if !status.missing_columns.is_empty() {
            let _ = writeln!(out, "      missing columns: {}", status.missing_columns.join(", "));
        }
        if status.state != TableState::Unknown && !status.missing_indexes.is_empty() {
            let _ = writeln!(out, "      missing indexes: {}", status.missing_indexes.join(", "));
        }
    }
    out
}

pub fn render_init(report: &InitReport) -> String {
    let mut out = String::new();
    if report.is_noop() {
        let _ = writeln!(
            out,
            "{} (model v{})",
            "init: no changes".if_supports_color(Stdout, |t| t.green()),
            report.model_version
        );
        return out;
    }
    let _ = writeln!(
        out,
        "{} {} statement(s) on {} table(s)",
        "init: applied".if_supports_color(Stdout, |t| t.green()),
        report.statement_count(),
        report.changed().count()
    );
    for outcome in report.changed() {
        let _ = writeln!(out, "  {}", outcome.table.if_supports_color(Stdout, |t| t.bold()));
        if outcome.created {
            let _ = writeln!(out, "      created table");
        }
        for col in &outcome.added_columns {
            let _ = writeln!(out, "      + column {}", col);
        }
        for idx in &outcome.created_indexes {
            let _ = writeln!(out, "      + index {}", idx);
        }
    }
    out
}

pub fn render_plan(plans: &[TablePlan]) -> String {
    let mut out = String::new();
    let pending: Vec<_> = plans.iter().filter(|p| !p.is_empty()).collect();
    if pending.is_empty() {
        let _ = writeln!(out, "{}", "init --dry-run: no changes".if_supports_color(Stdout, |t| t.green()));
        return out;
    }
    let statements: usize = pending.iter().map(|p| p.changes.len()).sum();
    let _ = writeln!(
        out,
        "{} {} statement(s) on {} table(s)",
        "init --dry-run: would apply".if_supports_color(Stdout, |t| t.yellow()),
        statements,
        pending.len()
    );
    for plan in pending {
        let _ = writeln!(out, "  {}", plan.table.if_supports_color(Stdout, |t| t.bold()));
        for change in &plan.changes {
            let _ = writeln!(out, "      {}", change);
            for line in change.to_sql().lines() {
                let _ = writeln!(out, "        {}", line.if_supports_color(Stdout, |t| t.dimmed()));
            }
        }
    }
    out
}

pub fn render_init_error(err: &MigrateError) -> String {
    let status = "init failed:".if_supports_color(Stdout, |t| t.red()).to_string();
    match err {
        MigrateError::MigrationFailed { table, object, source } => format!(
            "{} table {} ({})\n  {}\n  re-run `vestnik-schema init` after fixing the cause\n",
            status, table, object, source
        ),
        MigrateError::LockTimeout { lock, waited } => format!(
            "{} lock {} still held after {:?}, another init is running; retry later\n",
            status, lock, waited
        ),
        MigrateError::IndexNameTaken { table, index, owner } => format!(
            "{} index {} for table {} is already taken by {}\n  rename or drop it on {}, then re-run `vestnik-schema init`\n",
            status, index, table, owner, owner
        ),
        MigrateError::Schema(e) => format!("{} {}\n", status, e),
    }
}

pub fn render_model(model: &SchemaModel) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Schema model v{} ({} tables):",
        model.version(),
        model.tables().count()
    );
    let _ = writeln!(out);
    for table in model.tables() {
        let _ = writeln!(out, "  {} ({} columns)", table.name, table.columns.len());
        for col in table.columns {
            let mut attrs = Vec::new();
            if col.primary_key {
                attrs.push("PK".to_string());
            } else if !col.nullable {
                attrs.push("NOT NULL".to_string());
            }
            if let Some(default) = col.default {
                attrs.push(format!("DEFAULT {}", default));
            }

            let attrs_str = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };

            let _ = writeln!(out, "    {}: {}{}", col.name, col.sql_type, attrs_str);
        }
        for idx in table.indexes {
            let cols: Vec<String> = idx.columns.iter().map(|c| c.to_sql()).collect();
            let unique = if idx.unique { "UNIQUE " } else { "" };
            let predicate = idx
                .predicate
                .map(|p| format!(" WHERE {}", p))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    {}INDEX {} ({}){}",
                unique,
                idx.name,
                cols.join(", "),
                predicate
            );
        }
        for constraint in table.constraints {
            let _ = writeln!(out, "    {}", constraint);
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vestnik_migrate::{TableOutcome, plan_table};
    use vestnik_schema::{DdlObject, LiveTable, TableStatus, vestnik_model};

    fn status(table: &'static str, state: TableState, cols: &[&'static str], idx: &[&'static str]) -> TableStatus {
        TableStatus {
            table,
            state,
            missing_columns: cols.to_vec(),
            missing_indexes: idx.to_vec(),
        }
    }

    fn plain() {
        owo_colors::set_override(false);
    }

    #[test]
    fn test_render_check_drift() {
        plain();
        let report = CheckReport {
            model_version: 4,
            tables: vec![
                status("users", TableState::Ready, &[], &[]),
                status(
                    "subscriptions",
                    TableState::ExistsNoRequiredColumns,
                    &["ends_at"],
                    &["ix_subscriptions_ends_at"],
                ),
            ],
        };
        insta::assert_snapshot!(render_check(&report, false), @r"
schema drift: 1 table(s)
{subscriptions: [ends_at]}
  users          READY
  subscriptions  EXISTS_NO_REQUIRED_COLUMNS
      missing columns: ends_at
      missing indexes: ix_subscriptions_ends_at
");
    }

    #[test]
    fn test_render_check_strict_index_drift() {
        plain();
        let report = CheckReport {
            model_version: 4,
            tables: vec![status(
                "subscriptions",
                TableState::ExistsColumnsComplete,
                &[],
                &["ix_subscriptions_ends_at"],
            )],
        };
        insta::assert_snapshot!(render_check(&report, false), @r"
schema ok (model v4, 1 tables)
  subscriptions  EXISTS_COLUMNS_COMPLETE
      missing indexes: ix_subscriptions_ends_at
");
        insta::assert_snapshot!(render_check(&report, true), @r"
schema index drift: 1 table(s) missing indexes
  subscriptions  EXISTS_COLUMNS_COMPLETE
      missing indexes: ix_subscriptions_ends_at
");
    }

    #[test]
    fn test_render_init() {
        plain();
        let report = InitReport {
            model_version: 4,
            tables: vec![
                TableOutcome {
                    table: "users",
                    created: false,
                    added_columns: vec![],
                    created_indexes: vec![],
                    statements: 0,
                },
                TableOutcome {
                    table: "subscriptions",
                    created: false,
                    added_columns: vec!["ends_at"],
                    created_indexes: vec!["ix_subscriptions_ends_at"],
                    statements: 2,
                },
            ],
        };
        insta::assert_snapshot!(render_init(&report), @r"
init: applied 2 statement(s) on 1 table(s)
  subscriptions
      + column ends_at
      + index ix_subscriptions_ends_at
");
    }

    #[test]
    fn test_render_plan() {
        plain();
        let model = vestnik_model().unwrap();
        let spec = model.table("subscriptions").unwrap();
        let mut live = LiveTable {
            exists: true,
            ..LiveTable::default()
        };
        live.columns.extend(spec.columns.iter().map(|c| c.name.to_string()));
        live.columns.remove("ends_at");
        live.indexes.extend(spec.indexes.iter().map(|i| i.name.to_string()));
        live.indexes.remove("ix_subscriptions_ends_at");

        insta::assert_snapshot!(render_plan(&[plan_table(spec, &live)]), @r#"
init --dry-run: would apply 2 statement(s) on 1 table(s)
  subscriptions
      + ends_at: TIMESTAMPTZ (nullable)
        ALTER TABLE "subscriptions" ADD COLUMN IF NOT EXISTS "ends_at" TIMESTAMPTZ;
      + INDEX ix_subscriptions_ends_at (ends_at)
        CREATE INDEX IF NOT EXISTS "ix_subscriptions_ends_at" ON "subscriptions" ("ends_at");
"#);
        assert_eq!(render_plan(&[]), "init --dry-run: no changes\n");
    }

    #[test]
    fn test_render_init_error() {
        plain();
        let failed = MigrateError::MigrationFailed {
            table: "subscriptions",
            object: DdlObject::Commit,
            source: vestnik_schema::Error::Rejected("serialization failure".to_string()),
        };
        insta::assert_snapshot!(render_init_error(&failed), @r"
init failed: table subscriptions (commit)
  statement rejected: serialization failure
  re-run `vestnik-schema init` after fixing the cause
");

        let timeout = MigrateError::LockTimeout {
            lock: vestnik_migrate::INIT_LOCK_NAME,
            waited: Duration::from_secs(30),
        };
        insta::assert_snapshot!(render_init_error(&timeout), @r"
init failed: lock vestnik.schema.init still held after 30s, another init is running; retry later
");
    }

    #[test]
    fn test_render_model() {
        plain();
        let out = render_model(&vestnik_model().unwrap());
        assert!(out.starts_with("Schema model v"));
        assert!(out.contains("    ends_at: TIMESTAMPTZ\n"));
        assert!(out.contains(
            "    UNIQUE INDEX ux_channels_tg_channel_id (\"tg_channel_id\") WHERE tg_channel_id IS NOT NULL\n"
        ));
        assert!(out.contains("    role: VARCHAR(32) [NOT NULL, DEFAULT 'guest']\n"));
    }
}
