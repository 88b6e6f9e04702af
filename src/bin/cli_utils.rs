use seismo_mmdb::DataValue;
use std::net::IpAddr;

/// Format IP and prefix length as the CIDR of the containing network
pub fn format_cidr(ip_str: &str, prefix_len: u8) -> String {
    match ip_str.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(ipv4)) => {
            let mask = if prefix_len == 0 {
                0u32
            } else {
                !0u32 << (32 - prefix_len.min(32))
            };
            let network = std::net::Ipv4Addr::from(u32::from(ipv4) & mask);
            format!("{}/{}", network, prefix_len)
        }
        Ok(IpAddr::V6(ipv6)) => {
            let mask = if prefix_len == 0 {
                0u128
            } else {
                !0u128 << (128 - prefix_len.min(128))
            };
            let network = std::net::Ipv6Addr::from(u128::from(ipv6) & mask);
            format!("{}/{}", network, prefix_len)
        }
        Err(_) => format!("{}/{}", ip_str, prefix_len),
    }
}

pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub fn format_qps(qps: f64) -> String {
    if qps >= 1_000_000.0 {
        format!("{:.2}M", qps / 1_000_000.0)
    } else if qps >= 1_000.0 {
        format!("{:.2}K", qps / 1_000.0)
    } else {
        format!("{:.2}", qps)
    }
}

/// JSON rendering; objects come out key-sorted since serde_json is built
/// without its `preserve_order` feature
pub fn data_value_to_json(data: &DataValue) -> serde_json::Value {
    serde_json::to_value(data).unwrap_or(serde_json::Value::Null)
}

pub fn format_unix_timestamp(timestamp: u64) -> String {
    let days = timestamp / 86400;
    let remaining = timestamp % 86400;
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;

    let (year, month, day) = days_to_ymd(days);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        year, month, day, hours, minutes, seconds
    )
}

// Convert days since Unix epoch to year/month/day
fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    let mut year = 1970;
    let mut remaining_days = days;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for &days_in_month in &days_in_months {
        if remaining_days < days_in_month {
            break;
        }
        remaining_days -= days_in_month;
        month += 1;
    }

    (year, month, remaining_days + 1)
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cidr() {
        assert_eq!(format_cidr("1.1.1.5", 30), "1.1.1.4/30");
        assert_eq!(format_cidr("2001:db8::1", 32), "2001:db8::/32");
        assert_eq!(format_cidr("8.8.8.8", 0), "0.0.0.0/0");
    }

    #[test]
    fn test_format_unix_timestamp() {
        assert_eq!(format_unix_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_unix_timestamp(951_782_400), "2000-02-29 00:00:00 UTC");
    }

    #[test]
    fn test_data_value_to_json_sorts_keys() {
        let mut entries = std::collections::HashMap::new();
        for key in ["zh", "en", "de"] {
            entries.insert(key.to_string(), DataValue::String(key.to_uppercase()));
        }
        entries.insert("big".to_string(), DataValue::Uint128(u128::MAX));

        let json = data_value_to_json(&DataValue::Map(entries)).to_string();
        assert_eq!(
            json,
            format!(
                r#"{{"big":"{}","de":"DE","en":"EN","zh":"ZH"}}"#,
                u128::MAX
            )
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(12), "12");
    }
}
