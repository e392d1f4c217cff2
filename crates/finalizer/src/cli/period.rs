use anyhow::Result;
use clap::Subcommand;
use mining_token_period::{
    Granularity, Period, TokenId,
    day::{format_day, parse_day},
    generator,
};
use tabled::{Table, Tabled, settings::Style};

/// Offline token id commands
#[derive(Subcommand, Debug)]
pub enum PeriodCommands {
    #[command(
        about = "List the token ids of every bucket inside a date range",
        after_help = r#"Examples:
    # Weekly tokens for February 2022
    token-ids --start 2022-02-01 --end 2022-03-01 --granularity weekly"#
    )]
    TokenIds {
        /// First day of the range (YYYY-MM-DD, inclusive)
        #[arg(long, value_name = "DATE")]
        start: String,

        /// End of the range (YYYY-MM-DD, exclusive)
        #[arg(long, value_name = "DATE")]
        end: String,

        /// daily, weekly or biweekly
        #[arg(short, long, default_value = "daily")]
        granularity: Granularity,
    },
    #[command(about = "Decode a token id (decimal or 0x hex) into its period")]
    Decode {
        /// Token id
        id: TokenId,
    },
}

#[derive(Tabled)]
struct PeriodRow {
    #[tabled(rename = "type")]
    kind: &'static str,
    start: String,
    end: String,
    start_ts: i64,
    end_ts: i64,
    id: String,
}

impl From<&Period> for PeriodRow {
    fn from(period: &Period) -> Self {
        Self {
            kind: period.kind(),
            start: format_day(period.start_ts()),
            end: format_day(period.end_ts()),
            start_ts: period.start_ts(),
            end_ts: period.end_ts(),
            id: format!("0x{}", period.token_id().to_hex()),
        }
    }
}

pub fn handle(cmd: PeriodCommands) -> Result<()> {
    match cmd {
        PeriodCommands::TokenIds {
            start,
            end,
            granularity,
        } => {
            let periods = generator::generate(parse_day(&start)?, parse_day(&end)?, granularity)?;
            let rows: Vec<PeriodRow> = periods.iter().map(PeriodRow::from).collect();
            println!("{}", Table::new(rows).with(Style::psql()));
        }
        PeriodCommands::Decode { id } => {
            let period = Period::decode(id)?;
            println!(
                "{}",
                Table::new([PeriodRow::from(&period)]).with(Style::psql())
            );
            println!("decimal: {}", id.to_decimal());
        }
    }
    Ok(())
}
