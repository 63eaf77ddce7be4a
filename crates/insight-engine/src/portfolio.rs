use insight_core::ValuedPosition;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupId {
    Cash,
    Core,
    Crypto,
    Others,
}

impl GroupId {
    const ORDER: [GroupId; 4] = [GroupId::Cash, GroupId::Core, GroupId::Crypto, GroupId::Others];

    pub fn label(self) -> &'static str {
        match self {
            GroupId::Cash => "Cash / Liquidity",
            GroupId::Core => "Core Portfolio",
            GroupId::Crypto => "Crypto",
            GroupId::Others => "Others",
        }
    }

    fn for_asset_type(asset_type: Option<&str>) -> Self {
        let kind = asset_type.unwrap_or("other").to_lowercase();
        match kind.as_str() {
            "cash" => GroupId::Cash,
            "etf" | "fund" | "mmf" | "gold" => GroupId::Core,
            "crypto" => GroupId::Crypto,
            _ => GroupId::Others,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioGroup {
    pub id: GroupId,
    pub label: String,
    pub items: Vec<ValuedPosition>,
    pub total_sgd: f64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSlice {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedPortfolio {
    pub groups: Vec<PortfolioGroup>,
    pub total_sgd: f64,
    pub allocation_by_group: Vec<AllocationSlice>,
}

/// Bucket positions for the dashboard: fixed group order, empty groups
/// dropped, items sorted by SGD value descending.
pub fn group_portfolio(positions: Vec<ValuedPosition>) -> GroupedPortfolio {
    let mut buckets: [Vec<ValuedPosition>; 4] = Default::default();
    for position in positions {
        let id = GroupId::for_asset_type(position.asset_type.as_deref());
        buckets[id as usize].push(position);
    }

    let mut groups: Vec<PortfolioGroup> = GroupId::ORDER
        .into_iter()
        .zip(buckets)
        .filter(|(_, items)| !items.is_empty())
        .map(|(id, mut items)| {
            items.sort_by(|a, b| b.value_or_zero().total_cmp(&a.value_or_zero()));
            let total_sgd = items.iter().map(ValuedPosition::value_or_zero).sum();
            PortfolioGroup {
                id,
                label: id.label().to_string(),
                items,
                total_sgd,
                weight_pct: 0.0,
            }
        })
        .collect();

    let total_sgd: f64 = groups.iter().map(|g| g.total_sgd).sum();
    for group in &mut groups {
        group.weight_pct = if total_sgd > 0.0 {
            group.total_sgd * 100.0 / total_sgd
        } else {
            0.0
        };
    }

    let allocation_by_group = groups
        .iter()
        .map(|g| AllocationSlice {
            name: g.label.split(" /").next().unwrap_or(&g.label).to_string(),
            value: g.total_sgd,
        })
        .collect();

    GroupedPortfolio {
        groups,
        total_sgd,
        allocation_by_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(code: &str, kind: Option<&str>, value: Option<f64>) -> ValuedPosition {
        ValuedPosition {
            code: code.into(),
            asset_type: kind.map(String::from),
            value_sgd: value,
            ..Default::default()
        }
    }

    #[test]
    fn groups_in_fixed_order_sorted_by_value() {
        let grouped = group_portfolio(vec![
            position("BTC", Some("crypto"), Some(200.0)),
            position("ES3", Some("ETF"), Some(100.0)),
            position("A35", Some("fund"), Some(300.0)),
            position("SGD", Some("cash"), Some(400.0)),
        ]);

        let ids: Vec<GroupId> = grouped.groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GroupId::Cash, GroupId::Core, GroupId::Crypto]);

        let core = &grouped.groups[1];
        assert_eq!(core.items[0].code, "A35");
        assert_eq!(core.total_sgd, 400.0);
        assert_eq!(core.weight_pct, 40.0);
        assert_eq!(grouped.total_sgd, 1000.0);

        assert_eq!(grouped.allocation_by_group[0].name, "Cash");
        assert_eq!(grouped.allocation_by_group[1].name, "Core Portfolio");
    }

    #[test]
    fn unknown_and_missing_types_land_in_others() {
        let grouped = group_portfolio(vec![
            position("X", None, None),
            position("Y", Some("bond"), Some(50.0)),
        ]);
        assert_eq!(grouped.groups.len(), 1);
        assert_eq!(grouped.groups[0].id, GroupId::Others);
        assert_eq!(grouped.groups[0].items[0].code, "Y");
    }

    #[test]
    fn zero_total_gives_zero_weights() {
        let grouped = group_portfolio(vec![position("X", Some("cash"), Some(0.0))]);
        assert_eq!(grouped.groups[0].weight_pct, 0.0);
    }

    #[test]
    fn group_id_serializes_lowercase() {
        assert_eq!(serde_json::to_value(GroupId::Core).unwrap(), "core");
    }
}
