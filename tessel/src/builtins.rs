//! Globals every context starts with.
use crate::context::ExecutionContext;
use crate::number::{parse_radix_integer, to_string_radix};
use crate::object::{ErrorKind, Object};
use crate::scope::PropertyAccess;
use crate::value::Value;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn error_value(kind: ErrorKind, message: &str) -> Value {
    Value::Object(Object::error(kind, message))
}

pub(crate) fn install(ctx: &mut ExecutionContext) {
    ctx.define_global("undefined", Value::Undefined);
    ctx.define_global("NaN", Value::Number(f64::NAN));
    ctx.define_global("Infinity", Value::Number(f64::INFINITY));

    ctx.define_native("print", 1, |_, _, args| {
        let line = args
            .iter()
            .map(|v| v.to_js_string().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!("{line}");
        Ok(Value::Undefined)
    });
    ctx.define_native("String", 1, |_, _, args| {
        Ok(args.first().map_or(Value::from(""), |v| Value::String(v.to_js_string())))
    });
    ctx.define_native("Number", 1, |_, _, args| {
        Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
    });
    ctx.define_native("isNaN", 1, |_, _, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan())));
    ctx.define_native("parseInt", 2, |_, _, args| {
        let radix = arg(args, 1).to_number();
        Ok(Value::Number(parse_int(&arg(args, 0).to_js_string(), radix)))
    });

    for kind in ErrorKind::ALL {
        ctx.define_native(kind.name(), 1, move |_, _, args| {
            let message = match args.first() {
                None | Some(Value::Undefined) => String::new(),
                Some(v) => v.to_js_string().to_string(),
            };
            Ok(error_value(kind, &message))
        });
    }

    let to_string = Object::native("toString", 1, |_, this, args| {
        let Value::Number(n) = this else {
            return Err(error_value(
                ErrorKind::TypeError,
                "Number.prototype.toString called on a non-number",
            ));
        };
        let radix = match args.first() {
            None | Some(Value::Undefined) => 10.0,
            Some(v) => v.to_number().trunc(),
        };
        if !(2.0..=36.0).contains(&radix) {
            return Err(error_value(
                ErrorKind::RangeError,
                "toString() radix must be between 2 and 36",
            ));
        }
        Ok(Value::string(to_string_radix(*n, radix as u32)))
    });
    ctx.number_prototype.put_property("toString", Value::Object(to_string));
}

/// `parseInt`: optional sign, `0x` prefix for radix 16 or unspecified, then
/// the longest run of digits valid in the radix.
fn parse_int(text: &str, radix: f64) -> f64 {
    let text = text.trim_start();
    let (sign, mut body) = match text.as_bytes().first() {
        Some(b'-') => (-1.0, &text[1..]),
        Some(b'+') => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    let mut radix = if radix.is_nan() { 0 } else { radix.trunc() as i64 };
    if radix == 0 || radix == 16 {
        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            body = hex;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let end = body
        .find(|c: char| !c.is_digit(radix as u32))
        .unwrap_or(body.len());
    parse_radix_integer(&body[..end], radix as u32).map_or(f64::NAN, |n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextCreateInfo;

    fn eval(source: &str) -> Value {
        ExecutionContext::new(ContextCreateInfo::default())
            .evaluate(source)
            .unwrap()
    }

    #[test]
    fn number_to_string_with_radix() {
        assert_eq!(eval("(0.1).toString()"), Value::from("0.1"));
        assert_eq!(eval("(255).toString(16)"), Value::from("ff"));
        assert_eq!(eval("(-5).toString(2)"), Value::from("-101"));
        assert_eq!(eval("(1e21).toString()"), Value::from("1e+21"));
        assert_eq!(eval("(0.5).toString(2)"), Value::from("0.1"));
    }

    #[test]
    fn bad_radix_is_a_range_error() {
        let source = "var r\ntry { (1).toString(1) } catch (e) { r = String(e) }\nr";
        assert_eq!(
            eval(source),
            Value::from("RangeError: toString() radix must be between 2 and 36")
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(eval("Number('0x1f') + Number(' 1 ')"), Value::Number(32.0));
        assert_eq!(eval("String(1 / 3)"), Value::from("0.3333333333333333"));
        assert_eq!(eval("isNaN(Number('x'))"), Value::Bool(true));
        assert_eq!(eval("NaN == NaN"), Value::Bool(false));
        assert_eq!(eval("-Infinity < 0"), Value::Bool(true));
    }

    #[test]
    fn parse_int_prefixes() {
        assert_eq!(parse_int("  42px", f64::NAN), 42.0);
        assert_eq!(parse_int("-0x1A", f64::NAN), -26.0);
        assert_eq!(parse_int("z", 36.0), 35.0);
        assert_eq!(parse_int("101", 2.0), 5.0);
        assert!(parse_int("9", 8.0).is_nan());
        assert!(parse_int("1", 40.0).is_nan());
    }

    #[test]
    fn error_constructors() {
        assert_eq!(eval("var e = TypeError('bad')\ne.name + ': ' + e.message"), Value::from("TypeError: bad"));
        assert_eq!(eval("String(Error())"), Value::from("Error"));
    }
}
