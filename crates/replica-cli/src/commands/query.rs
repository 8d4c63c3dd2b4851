//! Query, tables, and columns command implementations

use colored::Colorize;
use replica_core::{Replicas, RowSet, Source, Value};

use crate::error::Result;

fn source(remote: bool) -> Source {
    if remote { Source::Remote } else { Source::Local }
}

/// Render rows as a plain aligned table.
fn render_table(rows: &RowSet) -> Vec<String> {
    let cells: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect();

    let widths: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(String::len)
                .chain(std::iter::once(name.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![line(rows.columns.as_slice())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(cells.iter().map(|row| line(row.as_slice())));
    lines
}

/// Run the query command
pub fn run_query(
    replicas: &Replicas,
    alias: &str,
    sql: &str,
    params: &[String],
    remote: bool,
    json: bool,
) -> Result<()> {
    let params: Vec<Value> = params.iter().map(|p| Value::from(p.as_str())).collect();
    let rows = if remote {
        replicas.read_remote(alias, sql, &params)?
    } else {
        replicas.read(alias, sql, &params)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut lines = render_table(&rows).into_iter();
    if let Some(header) = lines.next() {
        println!("{}", header.bold());
    }
    for line in lines {
        println!("{line}");
    }
    println!("{}", format!("({} rows)", rows.len()).dimmed());
    Ok(())
}

/// Run the tables command
pub fn run_tables(replicas: &Replicas, alias: &str, remote: bool) -> Result<()> {
    let tables = replicas.inspector().table_list(alias, source(remote))?;

    if tables.is_empty() {
        println!("{}", "No tables".dimmed());
    }
    for table in tables {
        println!("  {} {}", "+".green(), table.cyan());
    }
    Ok(())
}

/// Run the columns command
pub fn run_columns(replicas: &Replicas, alias: &str, table: &str, remote: bool) -> Result<()> {
    let columns = replicas
        .inspector()
        .table_columns(alias, table, source(remote))?;

    if columns.is_empty() {
        println!("{} {}", "No such table:".yellow(), table);
        return Ok(());
    }

    println!("{}:", table.bold());
    for column in columns {
        let mut flags = Vec::new();
        if column.primary_key {
            flags.push("primary key".to_string());
        }
        if column.not_null {
            flags.push("not null".to_string());
        }
        if let Some(default) = &column.default_value {
            flags.push(format!("default {default}"));
        }

        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!(
            "  {} {}{}",
            column.name.cyan(),
            column.decl_type.dimmed(),
            flags
        );
    }
    Ok(())
}
