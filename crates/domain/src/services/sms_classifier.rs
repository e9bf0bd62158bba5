//! SMS content classification.
//!
//! The ingestor treats classification as a black box behind [`SmsClassifier`].
//! [`KeywordClassifier`] is the default rule set: keyword matching for the
//! category, then regex extraction of the fields that category carries.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{ExtractedData, SmsCategory};

pub trait SmsClassifier: Send + Sync {
    fn classify(&self, content: &str, phone: Option<&str>) -> SmsCategory;

    fn extract(&self, content: &str, category: SmsCategory) -> ExtractedData;
}

lazy_static! {
    static ref VERIFICATION_KEYWORDS: Regex =
        Regex::new(r"(?i)验证码|校验码|动态码|code is|verification|one-time|\botp\b|passcode")
            .expect("valid regex");
    static ref VERIFICATION_HINT: Regex = Regex::new(r"(?i)验证|校验|动态|verify").expect("valid regex");
    static ref DIGITS_4_8: Regex = Regex::new(r"\d{4,8}").expect("valid regex");
    static ref CODE_AFTER_LABEL: Regex =
        Regex::new(r"(?i)(?:验证码|校验码|动态码|code)(?:\s*is)?[:：]?\s*(\d{4,8})")
            .expect("valid regex");
    static ref CODE_STANDALONE: Regex = Regex::new(r"\b\d{4,8}\b").expect("valid regex");

    static ref BANK_KEYWORDS: Regex = Regex::new(
        r"(?i)银行|账户|余额|交易|支付|转账|消费|存款|取款|信用卡|借记卡|\bbalance\b|\baccount\b|\bdebited\b|\bcredited\b"
    )
    .expect("valid regex");
    static ref BALANCE: Regex =
        Regex::new(r"(?i)(?:账户余额|余额|balance)(?:\s*is)?[:：]?\s*([\d,]+(?:\.\d+)?)")
            .expect("valid regex");
    static ref AMOUNT: Regex =
        Regex::new(r"(?i)(?:交易|支付|转账|消费|debited|credited|spent)[:：]?\s*([\d,]+(?:\.\d+)?)")
            .expect("valid regex");
    static ref DATE: Regex =
        Regex::new(r"(\d{4}[-/年]\d{1,2}[-/月]\d{1,2}日?)").expect("valid regex");

    static ref PROMOTION_KEYWORDS: Regex = Regex::new(
        r"(?i)优惠|促销|折扣|活动|特价|限时|抢购|秒杀|会员|积分|兑换|点击|链接|详情|了解更多|\bsale\b|\bdiscount\b|\bpromo"
    )
    .expect("valid regex");

    static ref EXPRESS_KEYWORDS: Regex = Regex::new(
        r"(?i)快递|物流|配送|派送|签收|取件|包裹|单号|\bparcel\b|\bpackage\b|\bdelivery\b|\btracking\b"
    )
    .expect("valid regex");
    static ref TRACKING_AFTER_LABEL: Regex =
        Regex::new(r"(?i)(?:运单号|快递号|单号|tracking(?:\s*(?:no\.?|number))?)[:：]?\s*([A-Z0-9]{10,})")
            .expect("valid regex");
    static ref TRACKING_STANDALONE: Regex = Regex::new(r"[A-Z0-9]{12,}").expect("valid regex");
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// Keyword and regex based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl SmsClassifier for KeywordClassifier {
    fn classify(&self, content: &str, _phone: Option<&str>) -> SmsCategory {
        if VERIFICATION_KEYWORDS.is_match(content)
            || (DIGITS_4_8.is_match(content) && VERIFICATION_HINT.is_match(content))
        {
            SmsCategory::Verification
        } else if BANK_KEYWORDS.is_match(content) {
            SmsCategory::Bank
        } else if PROMOTION_KEYWORDS.is_match(content) {
            SmsCategory::Promotion
        } else if EXPRESS_KEYWORDS.is_match(content) {
            SmsCategory::Express
        } else {
            SmsCategory::General
        }
    }

    fn extract(&self, content: &str, category: SmsCategory) -> ExtractedData {
        let mut data = ExtractedData::default();

        match category {
            SmsCategory::Verification => {
                data.verification_code = CODE_AFTER_LABEL
                    .captures(content)
                    .map(|c| c[1].to_string())
                    .or_else(|| {
                        let mut codes = CODE_STANDALONE.find_iter(content);
                        match (codes.next(), codes.next()) {
                            (Some(only), None) => Some(only.as_str().to_string()),
                            _ => None,
                        }
                    });
            }
            SmsCategory::Bank => {
                data.balance = BALANCE.captures(content).and_then(|c| parse_amount(&c[1]));
                data.amount = AMOUNT.captures(content).and_then(|c| parse_amount(&c[1]));
                data.date = DATE.captures(content).map(|c| c[1].to_string());
            }
            SmsCategory::Express => {
                data.tracking_number = TRACKING_AFTER_LABEL
                    .captures(content)
                    .map(|c| c[1].to_string())
                    .or_else(|| {
                        TRACKING_STANDALONE
                            .find(content)
                            .map(|m| m.as_str().to_string())
                    });
            }
            SmsCategory::Promotion | SmsCategory::General => {}
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(content: &str) -> (SmsCategory, ExtractedData) {
        let classifier = KeywordClassifier;
        let category = classifier.classify(content, None);
        (category, classifier.extract(content, category))
    }

    #[test]
    fn test_english_verification_code() {
        let (category, data) = classify("your code is 4821");
        assert_eq!(category, SmsCategory::Verification);
        assert_eq!(data.verification_code.as_deref(), Some("4821"));
    }

    #[test]
    fn test_chinese_verification_code() {
        let (category, data) = classify("【某某】您的验证码：583920，5分钟内有效");
        assert_eq!(category, SmsCategory::Verification);
        assert_eq!(data.verification_code.as_deref(), Some("583920"));
    }

    #[test]
    fn test_verification_without_label_needs_single_number() {
        let (_, data) = classify("Verification: 1234 or 5678");
        assert!(data.verification_code.is_none());
    }

    #[test]
    fn test_bank_fields() {
        let (category, data) =
            classify("您尾号1234的账户于2024-03-01消费 1,250.50元，余额:8,000.00元");
        assert_eq!(category, SmsCategory::Bank);
        assert_eq!(data.amount, Some(1250.5));
        assert_eq!(data.balance, Some(8000.0));
        assert_eq!(data.date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_express_tracking_number() {
        let (category, data) = classify("您的快递已到驿站，运单号：SF1234567890123");
        assert_eq!(category, SmsCategory::Express);
        assert_eq!(data.tracking_number.as_deref(), Some("SF1234567890123"));
    }

    #[test]
    fn test_promotion_and_general() {
        assert_eq!(classify("限时特价，点击链接").0, SmsCategory::Promotion);
        let (category, data) = classify("see you at dinner");
        assert_eq!(category, SmsCategory::General);
        assert!(data.is_empty());
    }
}
