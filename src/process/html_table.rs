use crate::error::SurveyError;
use crate::process::raw_table::RawTable;
use scraper::{ElementRef, Html, Selector};

/// Pull the first `<table>` out of an HTML document.
///
/// The first `<tr>` supplies headers from its `th`/`td` cells (blank header
/// texts are skipped); each later `<tr>` supplies one row from its `td`
/// cells. Rows with no non-empty cell are dropped.
pub fn read_html_table(html: &str) -> Result<RawTable, SurveyError> {
    let table_sel = Selector::parse("table").expect("table selector should parse");
    let row_sel = Selector::parse("tr").expect("row selector should parse");
    let header_sel = Selector::parse("th, td").expect("header cell selector should parse");
    let cell_sel = Selector::parse("td").expect("data cell selector should parse");

    let document = Html::parse_document(html);
    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| SurveyError::malformed("No table found in sheet"))?;

    let mut trs = table.select(&row_sel);
    let header_row = trs
        .next()
        .ok_or_else(|| SurveyError::malformed("No header row found"))?;

    let headers = header_row
        .select(&header_sel)
        .map(cell_text)
        .filter(|h| !h.is_empty())
        .collect();

    let rows = trs
        .map(|tr| tr.select(&cell_sel).map(cell_text).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(RawTable { headers, rows })
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
