use crate::api::Mode;
use crate::args::ListArgs;
use crate::client::{Client, EntryList};
use crate::commands::Out;
use crate::model::{LedgerEntry, ListFilters};
use crate::utils::TEMP_ID_PREFIX;
use crate::{Config, Result};

/// Lists pending transactions, newest first, followed by one page of confirmed transactions.
pub async fn list(config: Config, mode: Mode, args: ListArgs) -> Result<Out<EntryList>> {
    let filters = ListFilters {
        page: args.page.max(1),
        limit: args.limit.unwrap_or_else(|| config.page_size()).max(1),
        r#type: args.kind,
        category: args.category,
        search: args.search,
        from: args.from,
        to: args.to,
    };
    let client = Client::new(config, mode).await?;
    let list = client.list(&filters).await?;
    Ok(Out::new(render(&list), list))
}

fn render(list: &EntryList) -> String {
    let mut out = if list.online {
        format!(
            "Page {} of {} ({} transactions)",
            list.pagination.current_page, list.pagination.total_pages, list.pagination.total_items
        )
    } else {
        "Offline, showing pending transactions only".to_string()
    };
    if list.pending > 0 {
        out.push_str(&format!(", {} pending", list.pending));
    }
    for entry in &list.entries {
        let category = match entry {
            LedgerEntry::Confirmed(t) => t.category.name.as_str(),
            LedgerEntry::Pending(_) => "pending",
        };
        out.push_str(&format!(
            "\n  {:<10}  {}  {:<7}  {:>12}  {:<14}  {}",
            short_id(entry.id()),
            entry.date(),
            entry.r#type().to_string(),
            entry.amount().to_string(),
            category,
            entry.description()
        ));
    }
    out
}

/// Temporary ids are long; the prefix and a few characters are enough to tell them apart.
/// Ledger ids are shown in full since they are what `update` and `delete` take.
fn short_id(id: &str) -> &str {
    if id.starts_with(TEMP_ID_PREFIX) {
        id.get(..16).unwrap_or(id)
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_keeps_ledger_ids_whole() {
        let ledger_id = "clx9f2k3a0000qz8h4b7c1d2e";
        assert_eq!(short_id(ledger_id), ledger_id);
        assert_eq!(short_id("42"), "42");

        let temp_id = "offline-0123456789abcdef0123456789abcdef";
        assert_eq!(short_id(temp_id), "offline-01234567");
    }
}
