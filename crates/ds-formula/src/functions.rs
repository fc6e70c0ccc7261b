//! Function dispatch for the formula language.
//!
//! Names are case-insensitive. Ranges have already been expanded by the
//! parser, so every function sees a flat list of distribution values;
//! scalar parameters are unit-mass atoms coerced via
//! [`crate::parser::as_scalar`].

use ds_core::dist::Dist;
use ds_core::error::{Error, Result};
use ds_core::reduce::{ReduceOpts, reduce};
use ds_core::walk;

use crate::parser::{Parser, scalar, scalar_usize};

/// Fixed seed for sampling operators so cell evaluation is reproducible.
const SAMPLE_SEED: u64 = 0x5EED;

fn need(args: &[Dist], n: usize, name: &str) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error::Arity(format!("{name} expects {n} arguments, got {}", args.len())))
    }
}

fn need_pairs(args: &[Dist], name: &str) -> Result<()> {
    if args.len() >= 2 && args.len() % 2 == 0 {
        Ok(())
    } else {
        Err(Error::Arity(format!(
            "{name} expects an even number of (value, weight) arguments, got {}",
            args.len()
        )))
    }
}

fn scalar_pairs(args: &[Dist], name: &str) -> Result<Vec<(f64, f64)>> {
    args.chunks(2)
        .map(|pair| {
            Ok((
                scalar(&pair[0], &format!("{name} value"))?,
                scalar(&pair[1], &format!("{name} weight"))?,
            ))
        })
        .collect()
}

impl<'a> Parser<'a> {
    pub(crate) fn dispatch(&mut self, name: &str, args: Vec<Dist>) -> Result<Dist> {
        let limit = self.effective_limit();
        match name {
            "CONST" => {
                need(&args, 1, name)?;
                Dist::constant(scalar(&args[0], "CONST value")?)
            }
            "UNIFORM" => {
                need(&args, 2, name)?;
                Dist::uniform(scalar(&args[0], "UNIFORM min")?, scalar(&args[1], "UNIFORM max")?)
            }
            "NORMAL" => {
                need(&args, 2, name)?;
                Dist::normal(scalar(&args[0], "NORMAL mean")?, scalar(&args[1], "NORMAL sigma")?)
            }
            "DISCRETE" => {
                need_pairs(&args, name)?;
                Dist::discrete(&scalar_pairs(&args, name)?)
            }
            "CHOICE" => {
                need_pairs(&args, name)?;
                Ok(Dist::discrete(&scalar_pairs(&args, name)?)?.normalized())
            }
            "EXPONENTIAL" => {
                need(&args, 1, name)?;
                Dist::exponential(scalar(&args[0], "EXPONENTIAL lambda")?)
            }
            "POISSON" => {
                need(&args, 1, name)?;
                Dist::poisson(scalar(&args[0], "POISSON lambda")?, limit)
            }
            "BINOMIAL" => {
                need(&args, 2, name)?;
                let n = scalar_usize(&args[0], "BINOMIAL n")?;
                Dist::binomial(n, scalar(&args[1], "BINOMIAL p")?, limit)
            }
            "ADD" | "CONVOLVE" => {
                need(&args, 2, name)?;
                Ok(self.checked(self.convolve_values(&args[0], &args[1])))
            }
            "SUB" => {
                need(&args, 2, name)?;
                Ok(self.checked(self.subtract_values(&args[0], &args[1])))
            }
            "MUL" => {
                need(&args, 2, name)?;
                Ok(self.checked(self.multiply(&args[0], &args[1])?))
            }
            "DIV" => {
                need(&args, 2, name)?;
                Ok(self.checked(self.divide(&args[0], &args[1])?))
            }
            "POWER" => {
                need(&args, 2, name)?;
                let exponent = scalar(&args[1], "POWER exponent")?;
                Ok(self.checked(args[0].power(exponent)?))
            }
            "MIX" => {
                need(&args, 3, name)?;
                let p = scalar(&args[0], "MIX weight")?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(Error::Argument(format!("MIX weight must be in [0, 1], got {p}")));
                }
                // MIX(p, A, B): p weights the first distribution.
                Ok(self.checked(self.mix_values(&args[1], &args[2], 1.0 - p)?))
            }
            "SCALE" => {
                need(&args, 2, name)?;
                let factor = scalar(&args[1], "SCALE factor")?;
                Ok(self.checked(self.scale_values(&args[0], factor)))
            }
            "SHIFT" => {
                need(&args, 2, name)?;
                Ok(args[0].shift(scalar(&args[1], "SHIFT offset")?))
            }
            "BIN" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(Error::Arity(format!(
                        "BIN expects 2 or 3 arguments, got {}",
                        args.len()
                    )));
                }
                let a = scalar(&args[0], "BIN start")?;
                let b = scalar(&args[1], "BIN end")?;
                let p = match args.get(2) {
                    Some(arg) => scalar(arg, "BIN mass")?,
                    None => 1.0,
                };
                Dist::bin(a, b, p)
            }
            "RESAMPLE" => {
                need(&args, 2, name)?;
                let n = scalar_usize(&args[1], "RESAMPLE count")?;
                if n == 0 {
                    return Err(Error::Argument("RESAMPLE count must be >= 1".into()));
                }
                Ok(self.checked(args[0].resample(n, SAMPLE_SEED)?))
            }
            "REDUCE" => {
                if args.len() < 2 || args.len() > 6 {
                    return Err(Error::Arity(format!(
                        "REDUCE expects 2 to 6 arguments, got {}",
                        args.len()
                    )));
                }
                let target = scalar_usize(&args[1], "REDUCE target")?;
                if target == 0 {
                    return Err(Error::Argument("REDUCE target must be >= 1".into()));
                }
                let mut opts = ReduceOpts::safety(target);
                if let Some(arg) = args.get(2) {
                    opts.center = scalar(arg, "REDUCE center")?;
                }
                if let Some(arg) = args.get(3) {
                    opts.valley = Some(scalar(arg, "REDUCE valley threshold")?);
                }
                // Argument 5 is reserved; accepted and ignored.
                if let Some(arg) = args.get(4) {
                    scalar(arg, "REDUCE reserved")?;
                }
                if let Some(arg) = args.get(5) {
                    opts.width_weight = scalar(arg, "REDUCE width weight")?;
                }
                Ok(reduce(&args[0], &opts))
            }
            "MEAN" => {
                need(&args, 1, name)?;
                Dist::constant(self.mean_of(&args[0]))
            }
            "VAR" => {
                need(&args, 1, name)?;
                Dist::constant(self.variance_of(&args[0]))
            }
            "STD" => {
                need(&args, 1, name)?;
                Dist::constant(self.std_of(&args[0]))
            }
            "MEDIAN" => {
                need(&args, 1, name)?;
                Dist::constant(args[0].median())
            }
            "PROB_GT" => {
                need(&args, 2, name)?;
                let x = scalar(&args[1], "PROB_GT threshold")?;
                Dist::constant(self.prob_gt_of(&args[0], x))
            }
            "MAX_OF" => {
                need(&args, 2, name)?;
                let n = scalar_usize(&args[1], "MAX_OF count")?;
                Ok(self.checked(args[0].max_of(n)?))
            }
            "GEOM_SUM" => {
                need(&args, 2, name)?;
                let p = scalar(&args[1], "GEOM_SUM parameter")?;
                walk::geom_sum(&args[0], p, limit)
            }
            "REPEAT_ADD" => {
                need(&args, 2, name)?;
                let n = scalar_usize(&args[1], "REPEAT_ADD count")?;
                walk::repeat_add(&args[0], n, limit)
            }
            "RUIN_PROB" => {
                need(&args, 3, name)?;
                let w0 = scalar(&args[1], "RUIN_PROB initial wealth")?;
                let t = scalar_usize(&args[2], "RUIN_PROB steps")?;
                let p = walk::ruin_prob(&args[0], w0, t, limit, self.ruin_kernel(), SAMPLE_SEED)?;
                Dist::constant(p)
            }
            "REF" => {
                need(&args, 1, name)?;
                Ok(args[0].clone())
            }
            _ => Err(Error::UnknownFunction(name.to_string())),
        }
    }
}
