use {
    crate::domain::error::ValidationError,
    crate::domain::money::{Currency, Money},
    crate::domain::payment::StatementRecord,
    chrono::NaiveDate,
    serde::Deserialize,
    std::io::Read,
};

/// One row of a statement CSV. Headers match the field names; empty cells
/// deserialize as `None`.
#[derive(Debug, Deserialize)]
struct StatementRow {
    identifier: String,
    counter_account_number: Option<String>,
    counter_account_name: Option<String>,
    amount: String,
    currency: String,
    transaction_date: Option<NaiveDate>,
    description: Option<String>,
    constant_symbol: Option<String>,
    variable_symbol: Option<String>,
    specific_symbol: Option<String>,
}

/// Reads statement records from a CSV source. Thin input glue for the CLI;
/// real bank statement parsers are external collaborators feeding
/// `StatementRecord` values directly.
pub struct StatementReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> StatementReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily read and convert rows; a malformed row yields an error without
    /// ending the iteration.
    pub fn records(self) -> impl Iterator<Item = Result<StatementRecord, ValidationError>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(|e| ValidationError(format!("malformed statement row: {e}")))
                .and_then(row_to_record)
        })
    }
}

fn row_to_record(row: StatementRow) -> Result<StatementRecord, ValidationError> {
    let currency = Currency::try_from(row.currency.as_str())?;
    let minor = parse_amount(&row.amount)?;
    Ok(StatementRecord {
        identifier: row.identifier,
        counter_account_number: row.counter_account_number.filter(|s| !s.is_empty()),
        counter_account_name: row.counter_account_name.filter(|s| !s.is_empty()),
        amount: Money::from_minor(minor, currency),
        transaction_date: row.transaction_date,
        description: row.description.filter(|s| !s.is_empty()),
        constant_symbol: row.constant_symbol.filter(|s| !s.is_empty()),
        variable_symbol: row.variable_symbol.filter(|s| !s.is_empty()),
        specific_symbol: row.specific_symbol.filter(|s| !s.is_empty()),
    })
}

/// Parse a decimal amount such as `-1234.50` into minor units (two decimal
/// places for every supported currency).
pub fn parse_amount(text: &str) -> Result<i64, ValidationError> {
    let bad = || ValidationError(format!("invalid amount: {text}"));
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text),
    };
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    if whole.is_empty() || fraction.len() > 2 {
        return Err(bad());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(bad());
    }
    let whole: i64 = whole.parse().map_err(|_| bad())?;
    let mut minor_part: i64 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| bad())?
    };
    if fraction.len() == 1 {
        minor_part *= 10;
    }
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(minor_part))
        .map(|minor| sign * minor)
        .ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_amounts() {
        assert_eq!(parse_amount("1234.50"), Ok(123_450));
        assert_eq!(parse_amount("1234.5"), Ok(123_450));
        assert_eq!(parse_amount("1234"), Ok(123_400));
        assert_eq!(parse_amount("-42.01"), Ok(-4_201));
        assert_eq!(parse_amount("0.07"), Ok(7));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", "-", "1.234", "12,50", "abc", "1.2.3"] {
            assert!(parse_amount(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn reads_valid_rows() {
        let data = "\
identifier,counter_account_number,counter_account_name,amount,currency,transaction_date,description,constant_symbol,variable_symbol,specific_symbol
PID1,999/0100,Alice,1234.50,czk,2026-03-10,Payment,,12345,
PID2,998/0100,,-50.00,czk,2026-03-11,,,,";
        let records: Vec<_> = StatementReader::new(data.as_bytes()).records().collect();
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.identifier, "PID1");
        assert_eq!(first.amount.minor(), 123_450);
        assert_eq!(first.counter_account_name.as_deref(), Some("Alice"));
        let second = records[1].as_ref().unwrap();
        assert!(second.amount.is_negative());
        assert_eq!(second.description, None);
    }

    #[test]
    fn malformed_row_yields_error_not_panic() {
        let data = "\
identifier,counter_account_number,counter_account_name,amount,currency,transaction_date,description,constant_symbol,variable_symbol,specific_symbol
PID1,999/0100,,not-a-number,czk,2026-03-10,,,,";
        let records: Vec<_> = StatementReader::new(data.as_bytes()).records().collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_err());
    }
}
