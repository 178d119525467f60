//! Maps engine and backend failures to user-facing diagnostics.
//!
//! Configuration problems get a "修改报表配置" remediation and a 4xx status;
//! anything unclassified is reported as a system fault (5xx) whose low-level
//! text is only exposed in development mode.

use crate::error::{ConfigError, ExecError, ReportError, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NoFieldsSelected,
    AccessDenied,
    ReportNotFound,
    GroupingMismatch,
    NumericCoercionFailure,
    UnknownFieldReference,
    MalformedValuePath,
    ExpressionSyntaxError,
    GenericExecutionFailure,
}

impl ErrorKind {
    /// HTTP-equivalent status.
    pub const fn status(self) -> u16 {
        match self {
            Self::AccessDenied => 403,
            Self::ReportNotFound => 404,
            Self::GenericExecutionFailure => 500,
            _ => 400,
        }
    }

    pub const fn is_system_fault(self) -> bool {
        matches!(self, Self::GenericExecutionFailure)
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::NoFieldsSelected => "报表未选择任何显示字段、聚合字段或计算字段",
            Self::AccessDenied => "您没有权限查看此报表",
            Self::ReportNotFound => "报表不存在或已被删除",
            Self::GroupingMismatch => "分组字段与聚合字段不匹配",
            Self::NumericCoercionFailure => "数值转换失败，部分字段的值无法作为数字参与计算",
            Self::UnknownFieldReference => "报表引用了不存在的字段",
            Self::MalformedValuePath => "提交数据的结构与表单字段不一致，无法读取字段值",
            Self::ExpressionSyntaxError => "计算公式存在语法错误",
            Self::GenericExecutionFailure => "报表执行失败（系统故障）",
        }
    }

    pub const fn suggestion(self) -> &'static str {
        match self {
            Self::NoFieldsSelected => {
                "请修改报表配置：至少选择一个显示字段、聚合函数或计算字段后重试"
            }
            Self::AccessDenied => "请联系报表创建者或管理员为您的角色或账号授予访问权限",
            Self::ReportNotFound => "请刷新报表列表后重新选择报表",
            Self::GroupingMismatch => {
                "请修改报表配置：计算公式引用的字段必须已选为显示字段或已配置聚合函数"
            }
            Self::NumericCoercionFailure => {
                "请修改报表配置：确认参与聚合或计算的字段为数字类型，并检查提交数据中的非数字内容"
            }
            Self::UnknownFieldReference => {
                "请修改报表配置：所选字段可能已被删除或重命名，请重新选择字段"
            }
            Self::MalformedValuePath => "请检查对应表单的提交记录格式，或联系管理员修复历史数据",
            Self::ExpressionSyntaxError => {
                "请修改报表配置：检查计算公式中的字段名、运算符（+ - * /）和括号是否完整配对"
            }
            Self::GenericExecutionFailure => "系统故障，请稍后重试；如问题持续存在，请联系系统管理员",
        }
    }
}

/// Failure response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub error: ErrorKind,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
}

impl Diagnostic {
    #[inline]
    pub fn status(&self) -> u16 {
        self.error.status()
    }
}

pub fn classify(err: &ReportError) -> ErrorKind {
    match err {
        ReportError::ReportNotFound { .. } => ErrorKind::ReportNotFound,
        ReportError::AccessDenied { .. } => ErrorKind::AccessDenied,
        ReportError::Config(config) => match config {
            ConfigError::NoFieldsSelected => ErrorKind::NoFieldsSelected,
            ConfigError::UnknownFieldReference { .. } | ConfigError::InvalidIdentifier { .. } => {
                ErrorKind::UnknownFieldReference
            }
            ConfigError::ExpressionSyntax { .. } => ErrorKind::ExpressionSyntaxError,
            ConfigError::UngroupedFieldReference { .. } => ErrorKind::GroupingMismatch,
        },
        ReportError::Execution(exec) => match exec {
            ExecError::MalformedValuePath { .. } => ErrorKind::MalformedValuePath,
            ExecError::NumericOverflow { .. } => ErrorKind::NumericCoercionFailure,
            ExecError::Store(store) => classify_store(store),
        },
    }
}

fn classify_store(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::GroupingMismatch(_) => ErrorKind::GroupingMismatch,
        StoreError::NumericCoercion(_) => ErrorKind::NumericCoercionFailure,
        StoreError::UnknownField(_) => ErrorKind::UnknownFieldReference,
        StoreError::MalformedValuePath(_) => ErrorKind::MalformedValuePath,
        StoreError::ExpressionSyntax(_) => ErrorKind::ExpressionSyntaxError,
        StoreError::Backend(message) => {
            classify_backend_message(message).unwrap_or(ErrorKind::GenericExecutionFailure)
        }
    }
}

const BACKEND_PATTERNS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::GroupingMismatch,
        &["group by", "grouping", "must appear in the group"],
    ),
    (
        ErrorKind::NumericCoercionFailure,
        &[
            "invalid input syntax for type numeric",
            "invalid input syntax for type double",
            "invalid input syntax for type integer",
            "cannot cast",
            "could not convert",
        ],
    ),
    (
        ErrorKind::UnknownFieldReference,
        &["does not exist", "unknown column", "no such column", "unknown field"],
    ),
    (
        ErrorKind::MalformedValuePath,
        &["cannot extract", "json path", "jsonpath", "invalid path", "malformed"],
    ),
    (ErrorKind::ExpressionSyntaxError, &["syntax error"]),
];

/// Classifies free-form backend text; first matching class wins.
pub fn classify_backend_message(message: &str) -> Option<ErrorKind> {
    let lowered = message.to_lowercase();
    BACKEND_PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|(kind, _)| *kind)
}

pub fn translate(err: &ReportError, development_mode: bool) -> Diagnostic {
    let kind = classify(err);
    let original_error =
        (!kind.is_system_fault() || development_mode).then(|| err.to_string());
    Diagnostic {
        error: kind,
        message: kind.message().to_string(),
        suggestion: kind.suggestion().to_string(),
        original_error,
    }
}
