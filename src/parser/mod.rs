pub mod cells;
pub mod hierarchy;
pub mod ids;

use crate::error::RegionError;
use crate::sql::{self, SqlOptions};
use hierarchy::HierarchyOptions;
use ids::FlatRecord;

pub struct Conversion {
    pub rows: Vec<FlatRecord>,
    pub sql: String,
}

/// Four-stage pipeline: markup → records → tree → flat rows → SQL.
pub fn process_page(
    html: &str,
    tree_opts: &HierarchyOptions,
    sql_opts: &SqlOptions,
) -> Result<Conversion, RegionError> {
    let records = cells::extract(html)?;
    let tree = hierarchy::build(&records, tree_opts)?;
    let rows = ids::assign(&tree);
    let sql = sql::render(&rows, sql_opts);
    Ok(Conversion { rows, sql })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/snapshot.html").unwrap()
    }

    #[test]
    fn municipality_scenario_end_to_end() {
        let html = "<td>110000</td><td>北京市</td>\
                    <td>110100</td><td>市辖区</td>\
                    <td>110101</td><td>东城区</td>";
        let out = process_page(html, &HierarchyOptions::default(), &SqlOptions::default()).unwrap();
        let got: Vec<(u32, u32, u32, &str)> = out
            .rows
            .iter()
            .map(|r| (r.id, r.pid, r.code, r.name.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (1, 0, 110000, "北京市"),
                (2, 1, 110000, "市辖区"),
                (3, 2, 110101, "东城区"),
            ]
        );
        assert!(out.sql.contains("(3,2,110101,'东城区');"));
    }

    #[test]
    fn municipality_with_two_city_tiers_keeps_every_record() {
        let html = "<td>500000</td><td>重庆市</td>\
                    <td>500100</td><td>市辖区</td>\
                    <td>500101</td><td>万州区</td>\
                    <td>500200</td><td>县</td>\
                    <td>500228</td><td>梁平县</td>";
        let records = cells::extract(html).unwrap();
        let out = process_page(html, &HierarchyOptions::default(), &SqlOptions::default()).unwrap();
        assert_eq!(out.rows.len(), records.len());

        let county = out.rows.iter().find(|r| r.code == 500200).unwrap();
        assert_eq!(county.name, "县");
        assert_eq!(county.pid, 2);
    }

    #[test]
    fn fixture_keeps_every_record() {
        let html = fixture();
        let records = cells::extract(&html).unwrap();
        // offset 100 gives each synthetic city the code of its 市辖区 record
        let opts = HierarchyOptions {
            municipality_city_offset: 100,
            ..Default::default()
        };
        let out = process_page(&html, &opts, &SqlOptions::default()).unwrap();
        assert_eq!(out.rows.len(), records.len());

        let mut got: Vec<u32> = out.rows.iter().map(|r| r.code).collect();
        let mut want: Vec<u32> = records.iter().map(|r| r.code).collect();
        got.sort_unstable();
        want.sort_unstable();
        assert_eq!(got, want);
    }

    #[test]
    fn fixture_parent_links_are_consistent() {
        let out = process_page(&fixture(), &HierarchyOptions::default(), &SqlOptions::default()).unwrap();
        let by_id: HashMap<u32, &FlatRecord> = out.rows.iter().map(|r| (r.id, r)).collect();
        for (i, row) in out.rows.iter().enumerate() {
            assert_eq!(row.id as usize, i + 1);
            if row.pid == 0 {
                assert_eq!(row.code % 10000, 0);
                continue;
            }
            let parent = by_id[&row.pid];
            assert!(parent.id < row.id);
            assert_eq!(parent.code / 10000, row.code / 10000);
        }
        let xiantao = out.rows.iter().find(|r| r.code == 429004).unwrap();
        let hubei = out.rows.iter().find(|r| r.code == 420000).unwrap();
        assert_eq!(xiantao.pid, hubei.id);
    }

    #[test]
    fn extraction_failure_surfaces_as_error() {
        let err = process_page("<p>gone</p>", &HierarchyOptions::default(), &SqlOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, RegionError::Extraction { .. }));
    }
}
