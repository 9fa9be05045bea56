// src/views.rs
use crate::models::{Portfolio, Quote, Transaction};
use rust_decimal::Decimal;
use warp::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Guest,
    Member,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats money as US dollars, e.g. `$1,234.56` or `-$5.00`.
pub fn usd(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let digits = rounded.abs().to_string();
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${}.{:0<2}", sign, grouped, fraction)
}

fn layout(title: &str, nav: Nav, main: &str) -> String {
    let links = match nav {
        Nav::Member => concat!(
            r#"<a href="/quote">Quote</a> <a href="/buy">Buy</a> <a href="/sell">Sell</a> "#,
            r#"<a href="/history">History</a> <a href="/money">Money</a> <a href="/logout">Log Out</a>"#
        ),
        Nav::Guest => r#"<a href="/register">Register</a> <a href="/login">Log In</a>"#,
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Finance: {title}</title></head>\n<body>\n<nav><a href=\"/\">Finance</a> {links}</nav>\n<main>\n{main}\n</main>\n</body>\n</html>\n",
        title = escape(title),
        links = links,
        main = main
    )
}

pub fn apology(status: StatusCode, message: &str) -> String {
    layout(
        "Apology",
        Nav::Guest,
        &format!(
            "<h1 class=\"apology\">{}</h1>\n<p>{}</p>",
            status.as_u16(),
            escape(message)
        ),
    )
}

pub fn index(portfolio: &Portfolio) -> String {
    let mut rows = String::new();
    for row in &portfolio.rows {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&row.symbol),
            escape(&row.name),
            row.shares,
            usd(row.price),
            usd(row.total)
        ));
    }
    layout(
        "Portfolio",
        Nav::Member,
        &format!(
            "<table>\n<thead><tr><th>Symbol</th><th>Name</th><th>Shares</th><th>Price</th><th>TOTAL</th></tr></thead>\n<tbody>\n{}</tbody>\n<tfoot>\n<tr><td colspan=\"4\">CASH</td><td>{}</td></tr>\n<tr><td colspan=\"4\"></td><td><strong>{}</strong></td></tr>\n</tfoot>\n</table>",
            rows,
            usd(portfolio.cash),
            usd(portfolio.total)
        ),
    )
}

pub fn login() -> String {
    layout(
        "Log In",
        Nav::Guest,
        r#"<form action="/login" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<button type="submit">Log In</button>
</form>"#,
    )
}

pub fn register() -> String {
    layout(
        "Register",
        Nav::Guest,
        r#"<form action="/register" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<input name="confirmation" placeholder="Confirm password" type="password">
<button type="submit">Register</button>
</form>"#,
    )
}

pub fn quote_form() -> String {
    layout(
        "Quote",
        Nav::Member,
        r#"<form action="/quote" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<button type="submit">Quote</button>
</form>"#,
    )
}

pub fn quoted(quote: &Quote) -> String {
    layout(
        "Quoted",
        Nav::Member,
        &format!(
            "<p>A share of {} ({}) costs {}.</p>",
            escape(&quote.name),
            escape(&quote.symbol),
            usd(quote.price)
        ),
    )
}

pub fn buy_form() -> String {
    layout(
        "Buy",
        Nav::Member,
        r#"<form action="/buy" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<input autocomplete="off" min="1" name="shares" placeholder="Shares" type="number">
<button type="submit">Buy</button>
</form>"#,
    )
}

pub fn sell_form(symbols: &[String]) -> String {
    let options: String = symbols
        .iter()
        .map(|symbol| format!("<option value=\"{0}\">{0}</option>\n", escape(symbol)))
        .collect();
    layout(
        "Sell",
        Nav::Member,
        &format!(
            "<form action=\"/sell\" method=\"post\">\n<select name=\"symbol\">\n<option disabled selected value=\"\">Symbol</option>\n{}</select>\n<input autocomplete=\"off\" min=\"1\" name=\"shares\" placeholder=\"Shares\" type=\"number\">\n<button type=\"submit\">Sell</button>\n</form>",
            options
        ),
    )
}

pub fn history(transactions: &[Transaction]) -> String {
    let mut rows = String::new();
    for t in transactions {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&t.symbol),
            t.shares,
            usd(t.price),
            t.time.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    layout(
        "History",
        Nav::Member,
        &format!(
            "<table>\n<thead><tr><th>Symbol</th><th>Shares</th><th>Price</th><th>Transacted</th></tr></thead>\n<tbody>\n{}</tbody>\n</table>",
            rows
        ),
    )
}

pub fn money_form() -> String {
    layout(
        "Money",
        Nav::Member,
        r#"<form action="/money" method="post">
<select name="action"><option value="Add">Add</option><option value="Withdraw">Withdraw</option></select>
<input autocomplete="off" min="1" name="amount" placeholder="Amount" type="number">
<button type="submit">Submit</button>
</form>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_groups_thousands_and_pads_cents() {
        assert_eq!(usd(Decimal::new(123456, 2)), "$1,234.56");
        assert_eq!(usd(Decimal::from(10_000)), "$10,000.00");
        assert_eq!(usd(Decimal::new(5, 1)), "$0.50");
        assert_eq!(usd(Decimal::new(1234567891, 3)), "$1,234,567.89");
        assert_eq!(usd(Decimal::from(-500)), "-$500.00");
        assert_eq!(usd(Decimal::from(100)), "$100.00");
    }

    #[test]
    fn apology_escapes_the_message() {
        let page = apology(StatusCode::BAD_REQUEST, "<script>");
        assert!(page.contains("400"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
