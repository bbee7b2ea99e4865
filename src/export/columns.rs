/// Header of the primary-feed snapshot export. One row per (CreatedAt, PeriodType).
pub const PRIMARY_COLUMNS: [&str; 35] = [
    "CreatedAt",
    "PeriodType",
    "homeName",
    "awayName",
    "HomeScore",
    "AwayScore",
    // match result
    "Win1",
    "WinNone",
    "Win2",
    "Totals_1_WinMore",
    "Totals_1_WinLess",
    "Totals_2_WinMore",
    "Totals_2_WinLess",
    "Totals_3_WinMore",
    "Totals_3_WinLess",
    "Handicap_1_Win1",
    "Handicap_1_Win2",
    "Handicap_2_Win1",
    "Handicap_2_Win2",
    "Handicap_3_Win1",
    "Handicap_3_Win2",
    "FirstTeamTotals_1_WinMore",
    "FirstTeamTotals_1_WinLess",
    "FirstTeamTotals_2_WinMore",
    "FirstTeamTotals_2_WinLess",
    "SecondTeamTotals_1_WinMore",
    "SecondTeamTotals_1_WinLess",
    "SecondTeamTotals_2_WinMore",
    "SecondTeamTotals_2_WinLess",
    // tennis games
    "Games_1_WinMore",
    "Games_1_WinLess",
    "Games_2_WinMore",
    "Games_2_WinLess",
    "Games_3_WinMore",
    "Games_3_WinLess",
];

/// Leading metadata columns; everything after them is an odds cell.
pub const PRIMARY_META_COLUMNS: usize = 6;

/// Cell text for an odds column nothing was recorded for.
pub const NULL_CELL: &str = "null";

pub const PRIMARY_BOOKMAKER: &str = "Pinnacle";
pub const SECONDARY_BOOKMAKER: &str = "Lobbet";

/// Header of the analyzer export, one row per stored comparison.
/// `market` and `marketType` both carry the market type code.
pub const ANALYZER_COLUMNS: [&str; 19] = [
    "createdAt",
    "sportName",
    "matchId_pinnacle",
    "matchId_lobbet",
    "homeName",
    "awayName",
    "homeScore",
    "awayScore",
    "league_pinnacle",
    "league_lobbet",
    "bookmaker_1",
    "bookmaker_2",
    "market",
    "outcome",
    "value_pinnacle",
    "value_lobbet",
    "roi",
    "margin",
    "marketType",
];

/// Looks up the static name of an odds column, if the export has one.
pub fn primary_value_column(name: &str) -> Option<&'static str> {
    PRIMARY_COLUMNS[PRIMARY_META_COLUMNS..]
        .iter()
        .copied()
        .find(|c| *c == name)
}
