//! Data validation rules bound to worksheet cell ranges

use crate::cellref::CellRange;
use crate::styles::push_escaped;

/// Maximum number of data validations one worksheet can hold
pub const MAX_DATA_VALIDATIONS: usize = 65_534;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationType {
    Whole,
    Decimal,
    TextLength,
    List,
}

impl ValidationType {
    fn as_attr(self) -> &'static str {
        match self {
            ValidationType::Whole => "whole",
            ValidationType::Decimal => "decimal",
            ValidationType::TextLength => "textLength",
            ValidationType::List => "list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationOperator {
    Between,
    GreaterThan,
    LessThan,
}

impl ValidationOperator {
    fn as_attr(self) -> &'static str {
        match self {
            ValidationOperator::Between => "between",
            ValidationOperator::GreaterThan => "greaterThan",
            ValidationOperator::LessThan => "lessThan",
        }
    }
}

/// A data validation rule for a cell or cell range.
///
/// Created through the associated constructors; the error alert fields can
/// be set afterwards.
#[derive(Debug, Clone)]
pub struct DataValidation {
    value_type: ValidationType,
    operator: Option<ValidationOperator>,
    formula1: String,
    formula2: Option<String>,
    /// Accept blank cells without validating them
    pub ignore_blank: bool,
    /// Title of the error alert shown on invalid input
    pub error_title: Option<String>,
    /// Body of the error alert shown on invalid input
    pub error_message: Option<String>,
}

impl DataValidation {
    fn new(
        value_type: ValidationType,
        operator: Option<ValidationOperator>,
        formula1: String,
        formula2: Option<String>,
    ) -> Self {
        DataValidation {
            value_type,
            operator,
            formula1,
            formula2,
            ignore_blank: true,
            error_title: None,
            error_message: None,
        }
    }

    /// Whole numbers between `min` and `max`, inclusive
    pub fn integer_between(min: i64, max: i64) -> Self {
        Self::new(
            ValidationType::Whole,
            Some(ValidationOperator::Between),
            min.to_string(),
            Some(max.to_string()),
        )
    }

    /// Whole numbers strictly greater than `value`
    pub fn integer_greater_than(value: i64) -> Self {
        Self::new(
            ValidationType::Whole,
            Some(ValidationOperator::GreaterThan),
            value.to_string(),
            None,
        )
    }

    /// Whole numbers strictly less than `value`
    pub fn integer_less_than(value: i64) -> Self {
        Self::new(
            ValidationType::Whole,
            Some(ValidationOperator::LessThan),
            value.to_string(),
            None,
        )
    }

    /// Decimal numbers between `min` and `max`, inclusive
    pub fn decimal_between(min: f64, max: f64) -> Self {
        let mut num = ryu::Buffer::new();
        let formula1 = num.format(min).to_string();
        let formula2 = num.format(max).to_string();
        Self::new(
            ValidationType::Decimal,
            Some(ValidationOperator::Between),
            formula1,
            Some(formula2),
        )
    }

    /// Text whose length is between `min` and `max` characters, inclusive
    pub fn text_length_between(min: u32, max: u32) -> Self {
        Self::new(
            ValidationType::TextLength,
            Some(ValidationOperator::Between),
            min.to_string(),
            Some(max.to_string()),
        )
    }

    /// A dropdown list of allowed values
    pub fn list_values<S: AsRef<str>>(values: &[S]) -> Self {
        let mut formula = String::from("\"");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                formula.push(',');
            }
            formula.push_str(value.as_ref());
        }
        formula.push('"');
        Self::new(ValidationType::List, None, formula, None)
    }
}

/// Emit the `<dataValidations>` block for a worksheet body
pub(crate) fn push_data_validations_xml(
    out: &mut Vec<u8>,
    validations: &[(CellRange, DataValidation)],
) {
    if validations.is_empty() {
        return;
    }

    let mut num = itoa::Buffer::new();
    out.extend_from_slice(b"<dataValidations count=\"");
    out.extend_from_slice(num.format(validations.len()).as_bytes());
    out.extend_from_slice(b"\">");

    for (range, validation) in validations {
        out.extend_from_slice(b"<dataValidation type=\"");
        out.extend_from_slice(validation.value_type.as_attr().as_bytes());
        out.push(b'"');
        if let Some(operator) = validation.operator {
            out.extend_from_slice(b" operator=\"");
            out.extend_from_slice(operator.as_attr().as_bytes());
            out.push(b'"');
        }
        out.extend_from_slice(b" sqref=\"");
        range.push_to(out);
        out.push(b'"');
        if validation.ignore_blank {
            out.extend_from_slice(b" allowBlank=\"1\"");
        }
        out.extend_from_slice(b" showErrorMessage=\"1\"");
        if let Some(title) = &validation.error_title {
            out.extend_from_slice(b" errorTitle=\"");
            push_escaped(out, title);
            out.push(b'"');
        }
        if let Some(message) = &validation.error_message {
            out.extend_from_slice(b" error=\"");
            push_escaped(out, message);
            out.push(b'"');
        }
        out.push(b'>');

        out.extend_from_slice(b"<formula1>");
        push_escaped(out, &validation.formula1);
        out.extend_from_slice(b"</formula1>");
        if let Some(formula2) = &validation.formula2 {
            out.extend_from_slice(b"<formula2>");
            push_escaped(out, formula2);
            out.extend_from_slice(b"</formula2>");
        }
        out.extend_from_slice(b"</dataValidation>");
    }
    out.extend_from_slice(b"</dataValidations>");
}
