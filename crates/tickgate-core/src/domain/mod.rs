pub mod records;
pub mod symbol;

pub use records::{
    unix_to_date, Candle, CompanyInfo, Financials, IndicatorPoint, IndicatorSeries, NewsItem,
    Quote, StatementLines,
};
pub use symbol::{Market, Symbol};
