//! LDAP 风格过滤表达式
//!
//! 支持 RFC 1960 语法：`&`、`|`、`!` 组合，`=`、`~=`、`>=`、`<=` 比较，
//! `attr=*` 存在性判断以及 `attr=a*b*c` 子串匹配。属性名大小写不敏感，
//! 值中可用 `\` 转义 `(`、`)`、`*`、`\`。
//!
//! ```rust
//! use chips_management::module::filter::Filter;
//!
//! let filter: Filter = "(&(objectClass=org.demo.Greeter)(lang=zh*))".parse().unwrap();
//! assert_eq!(filter.to_string(), "(&(objectClass=org.demo.Greeter)(lang=zh*))");
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::value::PropertyValue;
use crate::utils::{ManagementError, Result};

/// 组合表达式允许的最大嵌套层数
const MAX_DEPTH: usize = 256;

/// 过滤表达式语法树
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
    Present { attr: String },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    /// 解析过滤表达式
    ///
    /// # Errors
    ///
    /// 语法错误时返回 `ManagementError::InvalidFilter`
    pub fn parse(expression: &str) -> Result<Self> {
        let mut parser = Parser {
            source: expression,
            chars: expression.chars().collect(),
            pos: 0,
            depth: 0,
        };
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("表达式末尾存在多余字符"));
        }
        Ok(filter)
    }

    /// 对一组属性求值
    pub fn matches(&self, properties: &BTreeMap<String, PropertyValue>) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(properties)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(properties)),
            Filter::Not(filter) => !filter.matches(properties),
            Filter::Present { attr } => lookup(properties, attr).is_some(),
            Filter::Equal { attr, value } => {
                lookup(properties, attr).is_some_and(|v| compare(v, Op::Equal, value))
            }
            Filter::Approx { attr, value } => {
                lookup(properties, attr).is_some_and(|v| compare(v, Op::Approx, value))
            }
            Filter::GreaterEq { attr, value } => {
                lookup(properties, attr).is_some_and(|v| compare(v, Op::GreaterEq, value))
            }
            Filter::LessEq { attr, value } => {
                lookup(properties, attr).is_some_and(|v| compare(v, Op::LessEq, value))
            }
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => lookup(properties, attr).is_some_and(|v| {
                substring_matches(v, initial.as_deref(), any, last.as_deref())
            }),
        }
    }
}

impl FromStr for Filter {
    type Err = ManagementError;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equal { attr, value } => write!(f, "({}={})", attr, escape(value)),
            Filter::Approx { attr, value } => write!(f, "({}~={})", attr, escape(value)),
            Filter::GreaterEq { attr, value } => write!(f, "({}>={})", attr, escape(value)),
            Filter::LessEq { attr, value } => write!(f, "({}<={})", attr, escape(value)),
            Filter::Present { attr } => write!(f, "({}=*)", attr),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// 解析器
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

/// 值中的一个字符，区分是否被转义
#[derive(Clone, Copy)]
enum ValueChar {
    Literal(char),
    Wildcard,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ManagementError {
        ManagementError::InvalidFilter {
            expression: self.source.to_string(),
            reason: format!("{}（位置 {}）", reason, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("缺少 '{}'", expected)))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter> {
        self.expect('(')?;
        if self.depth >= MAX_DEPTH {
            return Err(self.error("嵌套层数过深"));
        }
        self.depth += 1;
        let filter = self.parse_filter_body();
        self.depth -= 1;
        filter
    }

    fn parse_filter_body(&mut self) -> Result<Filter> {
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("表达式意外结束")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            filters.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if filters.is_empty() {
            return Err(self.error("组合表达式至少需要一个子表达式"));
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> Result<Filter> {
        let attr = self.parse_attr()?;
        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Op::Equal
            }
            Some(c @ ('~' | '>' | '<')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '~' => Op::Approx,
                    '>' => Op::GreaterEq,
                    _ => Op::LessEq,
                }
            }
            _ => return Err(self.error("缺少比较运算符")),
        };

        let value = self.parse_value()?;
        let has_wildcard = value.iter().any(|c| matches!(c, ValueChar::Wildcard));

        match op {
            Op::Equal if has_wildcard => Ok(Self::substring_or_present(attr, &value)),
            _ if has_wildcard => Err(self.error("只有 '=' 允许使用通配符")),
            Op::Equal => Ok(Filter::Equal {
                attr,
                value: literal(&value),
            }),
            Op::Approx => Ok(Filter::Approx {
                attr,
                value: literal(&value),
            }),
            Op::GreaterEq => Ok(Filter::GreaterEq {
                attr,
                value: literal(&value),
            }),
            Op::LessEq => Ok(Filter::LessEq {
                attr,
                value: literal(&value),
            }),
        }
    }

    fn parse_attr(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(self.error("缺少属性名"));
        }
        Ok(attr.to_string())
    }

    fn parse_value(&mut self) -> Result<Vec<ValueChar>> {
        let mut value = Vec::new();
        loop {
            match self.peek() {
                Some(')') => break,
                Some('(') => return Err(self.error("值中的 '(' 必须转义")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            value.push(ValueChar::Literal(c));
                            self.pos += 1;
                        }
                        None => return Err(self.error("转义符后缺少字符")),
                    }
                }
                Some('*') => {
                    value.push(ValueChar::Wildcard);
                    self.pos += 1;
                }
                Some(c) => {
                    value.push(ValueChar::Literal(c));
                    self.pos += 1;
                }
                None => return Err(self.error("缺少 ')'")),
            }
        }
        Ok(value)
    }

    fn substring_or_present(attr: String, value: &[ValueChar]) -> Filter {
        if let [ValueChar::Wildcard] = value {
            return Filter::Present { attr };
        }

        let mut parts: Vec<String> = vec![String::new()];
        for c in value {
            match c {
                ValueChar::Literal(c) => {
                    if let Some(current) = parts.last_mut() {
                        current.push(*c);
                    }
                }
                ValueChar::Wildcard => parts.push(String::new()),
            }
        }

        // 至少有一个通配符，因此 parts 至少两段
        let last = parts.pop().filter(|s| !s.is_empty());
        let initial = Some(parts.remove(0)).filter(|s| !s.is_empty());
        let any = parts.into_iter().filter(|s| !s.is_empty()).collect();
        Filter::Substring {
            attr,
            initial,
            any,
            last,
        }
    }
}

fn literal(value: &[ValueChar]) -> String {
    value
        .iter()
        .map(|c| match c {
            ValueChar::Literal(c) => *c,
            ValueChar::Wildcard => '*',
        })
        .collect()
}

// ============================================================================
// 求值
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

fn lookup<'a>(
    properties: &'a BTreeMap<String, PropertyValue>,
    attr: &str,
) -> Option<&'a PropertyValue> {
    properties.get(attr).or_else(|| {
        properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v)
    })
}

fn approx_normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn ordering_matches(ordering: Option<Ordering>, op: Op) -> bool {
    match (ordering, op) {
        (Some(o), Op::Equal | Op::Approx) => o == Ordering::Equal,
        (Some(o), Op::GreaterEq) => o != Ordering::Less,
        (Some(o), Op::LessEq) => o != Ordering::Greater,
        (None, _) => false,
    }
}

fn compare(actual: &PropertyValue, op: Op, operand: &str) -> bool {
    match actual {
        PropertyValue::String(s) => match op {
            Op::Approx => approx_normalize(s) == approx_normalize(operand),
            _ => ordering_matches(Some(s.as_str().cmp(operand)), op),
        },
        PropertyValue::Bool(b) => match op {
            Op::Equal | Op::Approx => operand.trim().eq_ignore_ascii_case(&b.to_string()),
            _ => false,
        },
        PropertyValue::Char(c) => {
            let mut chars = operand.trim().chars();
            match (chars.next(), chars.next()) {
                (Some(o), None) => match op {
                    Op::Approx => c.to_lowercase().eq(o.to_lowercase()),
                    _ => ordering_matches(Some(c.cmp(&o)), op),
                },
                _ => false,
            }
        }
        PropertyValue::Byte(_)
        | PropertyValue::Short(_)
        | PropertyValue::Int(_)
        | PropertyValue::Long(_) => {
            let parsed = operand.trim().parse::<i64>().ok();
            let ordering = actual.as_i64().zip(parsed).map(|(a, o)| a.cmp(&o));
            ordering_matches(ordering, op)
        }
        PropertyValue::Float(v) => {
            let ordering = operand
                .trim()
                .parse::<f32>()
                .ok()
                .and_then(|o| v.partial_cmp(&o));
            ordering_matches(ordering, op)
        }
        PropertyValue::Double(v) => {
            let ordering = operand
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|o| v.partial_cmp(&o));
            ordering_matches(ordering, op)
        }
        PropertyValue::List(items) => items.iter().any(|item| compare(item, op, operand)),
        PropertyValue::Map(_) | PropertyValue::Opaque(_) => false,
    }
}

fn substring_matches(
    actual: &PropertyValue,
    initial: Option<&str>,
    any: &[String],
    last: Option<&str>,
) -> bool {
    let s = match actual {
        PropertyValue::String(s) => s.as_str(),
        PropertyValue::List(items) => {
            return items
                .iter()
                .any(|item| substring_matches(item, initial, any, last))
        }
        _ => return false,
    };

    let mut rest = s;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last),
        None => true,
    }
}
