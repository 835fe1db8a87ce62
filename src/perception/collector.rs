use std::marker::PhantomData;
use std::ops::ControlFlow;

use super::Entry;

/// Folds perceived objects, nearest first, into a result.
///
/// `accumulate` receives the running value, the object, its distance and its
/// 1-based rank. Returning [ControlFlow::Break] ends the search early; no further
/// objects are looked for.
pub trait PerceptionCollector<T> {
    type Intermediate;
    type Output;

    fn identity(&mut self) -> Self::Intermediate;

    fn accumulate(
        &mut self,
        acc: Self::Intermediate,
        object: &T,
        distance: f64,
        number: usize,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate>;

    fn finalize(&mut self, acc: Self::Intermediate) -> Self::Output;
}

/// A collector made of three closures.
pub struct FnCollector<I, O, Id, Acc, Fin> {
    identity: Id,
    accumulate: Acc,
    finalize: Fin,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, Id, Acc, Fin> FnCollector<I, O, Id, Acc, Fin> {
    pub fn new<T>(identity: Id, accumulate: Acc, finalize: Fin) -> Self
    where
        Id: FnMut() -> I,
        Acc: FnMut(I, &T, f64, usize) -> ControlFlow<I, I>,
        Fin: FnMut(I) -> O,
    {
        Self {
            identity,
            accumulate,
            finalize,
            _types: PhantomData,
        }
    }
}

impl<T, I, O, Id, Acc, Fin> PerceptionCollector<T> for FnCollector<I, O, Id, Acc, Fin>
where
    Id: FnMut() -> I,
    Acc: FnMut(I, &T, f64, usize) -> ControlFlow<I, I>,
    Fin: FnMut(I) -> O,
{
    type Intermediate = I;
    type Output = O;

    fn identity(&mut self) -> I {
        (self.identity)()
    }

    fn accumulate(&mut self, acc: I, object: &T, distance: f64, number: usize) -> ControlFlow<I, I> {
        (self.accumulate)(acc, object, distance, number)
    }

    fn finalize(&mut self, acc: I) -> O {
        (self.finalize)(acc)
    }
}

/// Collects the nearest object.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nearest;

impl Nearest {
    pub fn new() -> Self {
        Self
    }
}

impl<T: Clone> PerceptionCollector<T> for Nearest {
    type Intermediate = Option<Entry<T>>;
    type Output = Option<Entry<T>>;

    fn identity(&mut self) -> Self::Intermediate {
        None
    }

    fn accumulate(
        &mut self,
        _acc: Self::Intermediate,
        object: &T,
        distance: f64,
        _number: usize,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate> {
        ControlFlow::Break(Some(Entry {
            distance,
            object: object.clone(),
        }))
    }

    fn finalize(&mut self, acc: Self::Intermediate) -> Self::Output {
        acc
    }
}

/// Collects up to a number of the nearest objects.
#[derive(Clone, Copy, Debug)]
pub struct FirstN(usize);

impl FirstN {
    pub fn new(count: usize) -> Self {
        Self(count)
    }
}

impl<T: Clone> PerceptionCollector<T> for FirstN {
    type Intermediate = Vec<Entry<T>>;
    type Output = Vec<Entry<T>>;

    fn identity(&mut self) -> Self::Intermediate {
        Vec::with_capacity(self.0)
    }

    fn accumulate(
        &mut self,
        mut acc: Self::Intermediate,
        object: &T,
        distance: f64,
        number: usize,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate> {
        if self.0 == 0 {
            return ControlFlow::Break(acc);
        }
        acc.push(Entry {
            distance,
            object: object.clone(),
        });
        match number >= self.0 {
            true => ControlFlow::Break(acc),
            false => ControlFlow::Continue(acc),
        }
    }

    fn finalize(&mut self, acc: Self::Intermediate) -> Self::Output {
        acc
    }
}

/// Collects every object up to a distance, in m.
#[derive(Clone, Copy, Debug)]
pub struct Within(f64);

impl Within {
    pub fn new(distance: f64) -> Self {
        Self(distance)
    }
}

impl<T: Clone> PerceptionCollector<T> for Within {
    type Intermediate = Vec<Entry<T>>;
    type Output = Vec<Entry<T>>;

    fn identity(&mut self) -> Self::Intermediate {
        vec![]
    }

    fn accumulate(
        &mut self,
        mut acc: Self::Intermediate,
        object: &T,
        distance: f64,
        _number: usize,
    ) -> ControlFlow<Self::Intermediate, Self::Intermediate> {
        if distance > self.0 {
            return ControlFlow::Break(acc);
        }
        acc.push(Entry {
            distance,
            object: object.clone(),
        });
        ControlFlow::Continue(acc)
    }

    fn finalize(&mut self, acc: Self::Intermediate) -> Self::Output {
        acc
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::perception::PerceptionFold;

    fn entries() -> Vec<Entry<char>> {
        "abcd"
            .chars()
            .enumerate()
            .map(|(i, object)| Entry {
                distance: 10.0 * i as f64,
                object,
            })
            .collect()
    }

    #[test]
    fn collectors_on_plain_entries() {
        assert_eq!(entries().into_iter().collect_with(Nearest).unwrap().object, 'a');
        let first: Vec<char> = entries()
            .into_iter()
            .collect_with(FirstN::new(2))
            .into_iter()
            .map(|e| e.object)
            .collect();
        assert_eq!(first, vec!['a', 'b']);
        assert!(entries().into_iter().collect_with(FirstN::new(0)).is_empty());
        assert_eq!(entries().into_iter().collect_with(Within::new(20.0)).len(), 3);
        assert!(Vec::<Entry<char>>::new()
            .into_iter()
            .collect_with(Nearest)
            .is_none());
    }

    #[test]
    fn ranks_start_at_one() {
        let ranks = entries().into_iter().collect_with(FnCollector::new(
            Vec::new,
            |mut ranks: Vec<usize>, _: &char, _: f64, number: usize| {
                ranks.push(number);
                ControlFlow::Continue(ranks)
            },
            |ranks: Vec<usize>| ranks,
        ));
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }
}
