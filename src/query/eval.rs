use crate::{
    error::GixError,
    gix::{Gix, IndexItem, IndexKey},
    merger::Merger,
    query::Expr,
};

impl<K> Expr<K>
where
    K: IndexKey,
{
    /// Evaluates the expression against `gix` using the index's merger.
    ///
    /// Returns the result items and whether they are negated, i.e. the
    /// result is every item except the returned ones.
    pub fn eval<T, M>(&self, gix: &mut Gix<K, T, M>) -> Result<(Vec<T>, bool), GixError>
    where
        T: IndexItem,
        M: Merger<K, T>,
    {
        self.eval_node(gix, None)
    }

    /// Evaluates the expression against `gix`, combining and normalizing
    /// postings with `merger` instead of the index's merger.
    pub fn eval_with<T, M, G>(
        &self,
        gix: &mut Gix<K, T, G>,
        merger: &M,
    ) -> Result<(Vec<T>, bool), GixError>
    where
        T: IndexItem,
        M: Merger<K, T>,
        G: Merger<K, T>,
    {
        self.eval_node(gix, Some(merger))
    }

    fn eval_node<T, G>(
        &self,
        gix: &mut Gix<K, T, G>,
        merger: Option<&dyn Merger<K, T>>,
    ) -> Result<(Vec<T>, bool), GixError>
    where
        T: IndexItem,
        G: Merger<K, T>,
    {
        match self {
            Expr::Empty => Ok((Vec::new(), false)),
            Expr::Key(key) => {
                let mut items = gix.postings(key)?.unwrap_or_default();
                merger.unwrap_or(gix.merger()).normalize(key, &mut items);
                Ok((items, false))
            }
            Expr::Not(expr) => {
                let (items, negated) = expr.eval_node(gix, merger)?;
                Ok((items, !negated))
            }
            Expr::And(left, right) => {
                let (mut left, left_neg) = left.eval_node(gix, merger)?;
                let (right, right_neg) = right.eval_node(gix, merger)?;
                let merger = merger.unwrap_or(gix.merger());
                let items = match (left_neg, right_neg) {
                    // !L & !R = !(L | R)
                    (true, true) => {
                        merger.union(&mut left, &right);
                        left
                    }
                    (false, false) => {
                        merger.intersect(&mut left, &right);
                        left
                    }
                    (false, true) => merger.difference(&left, &right),
                    (true, false) => merger.difference(&right, &left),
                };
                Ok((items, left_neg && right_neg))
            }
            Expr::Or(left, right) => {
                let (mut left, left_neg) = left.eval_node(gix, merger)?;
                let (right, right_neg) = right.eval_node(gix, merger)?;
                let merger = merger.unwrap_or(gix.merger());
                let items = match (left_neg, right_neg) {
                    // !L | !R = !(L & R)
                    (true, true) => {
                        merger.intersect(&mut left, &right);
                        left
                    }
                    (false, false) => {
                        merger.union(&mut left, &right);
                        left
                    }
                    // !L | R = !(L - R)
                    (true, false) => merger.difference(&left, &right),
                    (false, true) => merger.difference(&right, &left),
                };
                Ok((items, left_neg || right_neg))
            }
        }
    }
}
